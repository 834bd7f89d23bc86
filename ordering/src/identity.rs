use crate::model::ModelId;

/// Per-request binding of the acting user.
///
/// The authentication boundary resolves the inbound request to an
/// actor id and builds exactly one context, which is then passed by
/// reference through the call chain. Nothing reads identity from
/// ambient state; when the request ends the context is dropped and no
/// actor id can leak into a reused execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    actor_id: ModelId,
}

impl RequestContext {
    pub fn new(actor_id: ModelId) -> Self {
        Self { actor_id }
    }

    pub fn actor_id(&self) -> ModelId {
        self.actor_id
    }
}
