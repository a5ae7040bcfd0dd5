//! Enrollment decisions and payment settlement.
//!
//! The decision component answers whether a member can join a program and
//! under which payment/sponsorship treatment; the settlement component
//! finalizes paid enrollments from the payment processor's asynchronous
//! confirmation callback. Both create the unique (program, member)
//! enrollment record and fire the same fire-and-forget side effects.

pub(crate) mod checkout;
pub mod domain;
pub mod repository;
pub mod router;
pub(crate) mod service;

#[cfg(test)]
mod tests;

pub use checkout::{
    split_revenue, CheckoutHandle, CheckoutReference, CheckoutService, GatewayCheckout,
    GatewayError, PaymentGateway, RevenueSplit, Settlement, SettlementError, SettlementStatus,
    SettlementStore, PLATFORM_FEE_RATE,
};
pub use domain::{
    AccessType, CreatorId, EnrollmentDecision, EnrollmentRecord, Program, ProgramId,
    ProgramStatus, Treatment, UserId,
};
pub use repository::EnrollmentStore;
pub use router::{enrollment_router, EnrollmentApi, EnrollmentView};
pub use service::{EnrollmentError, EnrollmentService};
