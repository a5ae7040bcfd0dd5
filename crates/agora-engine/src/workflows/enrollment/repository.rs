use super::domain::{EnrollmentRecord, Program, ProgramId, UserId};
use crate::workflows::store::StoreError;

/// Storage abstraction for programs and enrollment records.
///
/// `insert_enrollment` is a conditional insert on the (program, member)
/// natural key and must fail with [`StoreError::Conflict`] when a record
/// already exists. `increment_participants` is an atomic bounded increment:
/// it must refuse with [`StoreError::CapacityExceeded`] once the program
/// capacity is reached, so two callers racing for the last seat cannot both
/// claim it. `release_participant` is its commutative inverse, used to hand
/// a claimed seat back when the subsequent record insert loses a duplicate
/// race.
pub trait EnrollmentStore: Send + Sync {
    fn fetch_program(&self, id: &ProgramId) -> Result<Option<Program>, StoreError>;
    fn fetch_enrollment(
        &self,
        program: &ProgramId,
        user: &UserId,
    ) -> Result<Option<EnrollmentRecord>, StoreError>;
    fn insert_enrollment(&self, record: EnrollmentRecord)
        -> Result<EnrollmentRecord, StoreError>;
    fn increment_participants(&self, id: &ProgramId) -> Result<u32, StoreError>;
    fn release_participant(&self, id: &ProgramId) -> Result<(), StoreError>;
}
