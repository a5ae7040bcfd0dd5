use crate::cli::ServeArgs;
use crate::infra::{
    AppState, CannedTipGenerator, InMemoryLedger, InMemoryNotificationSink, InMemoryRuleStore,
    MockPaymentGateway,
};
use crate::routes::app_router;
use agora_engine::config::AppConfig;
use agora_engine::error::AppError;
use agora_engine::telemetry;
use agora_engine::workflows::enrollment::{CheckoutService, EnrollmentApi, EnrollmentService};
use agora_engine::workflows::impact::ImpactValidationService;
use agora_engine::workflows::notify::NotificationOutbox;
use agora_engine::workflows::nudges::{NudgeEngine, NudgeThresholds, NudgeTrigger};
use agora_engine::workflows::sponsorship::QuotaLedger;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const OUTBOX_DRAIN_INTERVAL: Duration = Duration::from_secs(5);

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let ledger = Arc::new(InMemoryLedger::default());
    let rules = Arc::new(InMemoryRuleStore::default());
    let transport = Arc::new(InMemoryNotificationSink::default());
    let outbox = Arc::new(NotificationOutbox::default());
    let quota = Arc::new(QuotaLedger::new(rules, outbox.clone()));
    let nudges: Arc<dyn NudgeTrigger> = Arc::new(NudgeEngine::new(
        ledger.clone(),
        outbox.clone(),
        NudgeThresholds::default(),
    ));

    let enrollments = Arc::new(EnrollmentService::new(
        ledger.clone(),
        quota.clone(),
        outbox.clone(),
        nudges.clone(),
    ));
    let checkout = Arc::new(CheckoutService::new(
        ledger.clone(),
        quota,
        Box::new(MockPaymentGateway::default()),
        outbox.clone(),
        nudges.clone(),
    ));
    let impact = Arc::new(ImpactValidationService::new(
        ledger,
        Box::new(CannedTipGenerator),
        nudges,
    ));

    // Side effects are queued by the services and delivered out of band so a
    // slow transport never sits on the enrollment path.
    tokio::spawn({
        let outbox = outbox.clone();
        let transport = transport.clone();
        async move {
            let mut interval = tokio::time::interval(OUTBOX_DRAIN_INTERVAL);
            loop {
                interval.tick().await;
                let report = outbox.drain(transport.as_ref());
                if report.requeued > 0 {
                    warn!(requeued = report.requeued, "notification deliveries requeued");
                }
            }
        }
    });

    let app = app_router(
        EnrollmentApi {
            enrollments,
            checkout,
        },
        impact,
    )
    .layer(Extension(app_state))
    .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "agora marketplace engine ready");

    axum::serve(listener, app).await?;
    Ok(())
}
