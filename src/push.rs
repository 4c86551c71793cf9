use uuid::Uuid;

/// Boundary to the offline push-notification service. Fire-and-forget: a
/// lost notification never affects the message that triggered it.
pub trait PushGateway: Send + Sync {
    fn enqueue(&self, recipient: Uuid, preview: &str);
}

/// Stand-in gateway until the notification pipeline is wired up.
pub struct LogGateway;

impl PushGateway for LogGateway {
    fn enqueue(&self, recipient: Uuid, preview: &str) {
        tracing::debug!("push to {recipient}: {preview}");
    }
}
