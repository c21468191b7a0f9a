use tokio_util::sync::CancellationToken;

/// Client-side handle that cancels one running turn.
///
/// Cancelling ends the turn with `TurnError { kind: Cancelled }`. Tool calls
/// already dispatched keep running detached and their results are dropped.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

pub(crate) fn cancel_pair() -> (CancelHandle, CancellationToken) {
    let token = CancellationToken::new();
    (
        CancelHandle {
            token: token.clone(),
        },
        token,
    )
}
