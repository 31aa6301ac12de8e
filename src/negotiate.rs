use tracing::debug;

use crate::error::{EngineError, NegotiateError};
use crate::handle::{IceGatheringState, PeerHandle};
use crate::signaling::{SessionDescription, SignalingTransport};

/// Drive one offer/answer round against a remote peer.
///
/// The steps run strictly in order, each gating the next: create the offer,
/// commit it as the local description, wait for candidate gathering to
/// settle, exchange the final local description over signaling, commit the
/// returned description as the remote one. The first failure aborts the rest
/// of the chain; descriptions already committed are not rolled back.
///
/// A second call on a handle already past offer creation has an
/// engine-dependent outcome; the chain does not guard against it.
pub async fn negotiate<H, S>(
    handle: &H,
    signaling: &S,
) -> Result<SessionDescription, NegotiateError>
where
    H: PeerHandle + ?Sized,
    S: SignalingTransport + ?Sized,
{
    debug!(target = "rtc_dialer::negotiate", "creating offer");
    let offer = handle
        .create_offer()
        .await
        .map_err(NegotiateError::OfferCreation)?;

    debug!(target = "rtc_dialer::negotiate", "committing local description");
    handle
        .set_local_description(offer)
        .await
        .map_err(NegotiateError::LocalDescription)?;

    debug!(target = "rtc_dialer::negotiate", "waiting for ice gathering");
    wait_for_gathering(handle).await;

    // Re-read the committed description: after gathering it carries the full
    // candidate set, not the bare offer from step one.
    let local = handle.local_description().await.ok_or_else(|| {
        NegotiateError::LocalDescription(EngineError::new(
            "local description missing after commit",
        ))
    })?;

    debug!(target = "rtc_dialer::negotiate", kind = %local.kind, "exchanging descriptions");
    let remote = signaling.exchange(&local).await?;

    debug!(target = "rtc_dialer::negotiate", kind = %remote.kind, "committing remote description");
    handle
        .set_remote_description(remote.clone())
        .await
        .map_err(NegotiateError::RemoteDescription)?;

    Ok(remote)
}

/// Suspend until candidate gathering reports `complete`. An already-complete
/// handle resolves without subscribing at all; otherwise the wait resolves on
/// the first observed `complete` and drops its subscription right there.
///
/// No deadline is applied: a handle that never finishes gathering parks the
/// caller here indefinitely. Callers that need a bound wrap the whole round
/// in `tokio::time::timeout`.
async fn wait_for_gathering<H: PeerHandle + ?Sized>(handle: &H) {
    if handle.gathering_state() == IceGatheringState::Complete {
        return;
    }
    let mut gathering = handle.subscribe_gathering();
    // A transition may have landed between the check and the subscribe.
    if *gathering.borrow_and_update() == IceGatheringState::Complete {
        return;
    }
    while gathering.changed().await.is_ok() {
        if *gathering.borrow_and_update() == IceGatheringState::Complete {
            return;
        }
    }
    // Sender gone means the handle was torn down mid-wait; the following
    // steps surface the engine's rejection.
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use reqwest::StatusCode;
    use tokio::sync::watch;

    use super::*;
    use crate::error::SignalingError;
    use crate::signaling::SdpKind;

    type CallLog = Arc<Mutex<Vec<&'static str>>>;

    struct ScriptedHandle {
        calls: CallLog,
        gathering_tx: watch::Sender<IceGatheringState>,
        subscriptions: AtomicUsize,
        fail_offer: bool,
        fail_local_commit: bool,
        fail_remote_commit: bool,
        // When set, returned by local_description instead of the committed
        // offer, standing in for an offer augmented with candidates.
        local_after_gathering: Option<SessionDescription>,
        local: Mutex<Option<SessionDescription>>,
        remote: Mutex<Option<SessionDescription>>,
    }

    impl ScriptedHandle {
        fn new(initial: IceGatheringState, calls: CallLog) -> Self {
            Self {
                calls,
                gathering_tx: watch::channel(initial).0,
                subscriptions: AtomicUsize::new(0),
                fail_offer: false,
                fail_local_commit: false,
                fail_remote_commit: false,
                local_after_gathering: None,
                local: Mutex::new(None),
                remote: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl PeerHandle for ScriptedHandle {
        async fn create_offer(&self) -> Result<SessionDescription, EngineError> {
            self.calls.lock().unwrap().push("create_offer");
            if self.fail_offer {
                return Err(EngineError::new("connection closed"));
            }
            Ok(SessionDescription::offer("v=0 bare offer"))
        }

        async fn set_local_description(
            &self,
            desc: SessionDescription,
        ) -> Result<(), EngineError> {
            self.calls.lock().unwrap().push("set_local_description");
            if self.fail_local_commit {
                return Err(EngineError::new("invalid state"));
            }
            *self.local.lock().unwrap() = Some(desc);
            Ok(())
        }

        async fn local_description(&self) -> Option<SessionDescription> {
            self.local_after_gathering
                .clone()
                .or_else(|| self.local.lock().unwrap().clone())
        }

        async fn set_remote_description(
            &self,
            desc: SessionDescription,
        ) -> Result<(), EngineError> {
            self.calls.lock().unwrap().push("set_remote_description");
            if self.fail_remote_commit {
                return Err(EngineError::new("malformed sdp"));
            }
            *self.remote.lock().unwrap() = Some(desc);
            Ok(())
        }

        fn gathering_state(&self) -> IceGatheringState {
            *self.gathering_tx.borrow()
        }

        fn subscribe_gathering(&self) -> watch::Receiver<IceGatheringState> {
            self.subscriptions.fetch_add(1, Ordering::SeqCst);
            self.gathering_tx.subscribe()
        }
    }

    struct ScriptedSignaling {
        calls: CallLog,
        response: Option<SessionDescription>,
        received: Mutex<Option<SessionDescription>>,
    }

    impl ScriptedSignaling {
        fn answering(calls: CallLog, response: SessionDescription) -> Self {
            Self {
                calls,
                response: Some(response),
                received: Mutex::new(None),
            }
        }

        fn failing(calls: CallLog) -> Self {
            Self {
                calls,
                response: None,
                received: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl SignalingTransport for ScriptedSignaling {
        async fn exchange(
            &self,
            local: &SessionDescription,
        ) -> Result<SessionDescription, SignalingError> {
            self.calls.lock().unwrap().push("exchange");
            *self.received.lock().unwrap() = Some(local.clone());
            self.response
                .clone()
                .ok_or(SignalingError::Status(StatusCode::INTERNAL_SERVER_ERROR))
        }
    }

    fn fixed_answer() -> SessionDescription {
        SessionDescription::answer("v=0 answer")
    }

    #[tokio::test]
    async fn completed_gathering_runs_steps_in_order_without_subscribing() {
        let calls: CallLog = Arc::default();
        let handle = ScriptedHandle::new(IceGatheringState::Complete, calls.clone());
        let signaling = ScriptedSignaling::answering(calls.clone(), fixed_answer());

        let remote = negotiate(&handle, &signaling).await.expect("negotiates");

        assert_eq!(remote, fixed_answer());
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                "create_offer",
                "set_local_description",
                "exchange",
                "set_remote_description",
            ]
        );
        assert_eq!(handle.subscriptions.load(Ordering::SeqCst), 0);
        assert_eq!(*handle.remote.lock().unwrap(), Some(fixed_answer()));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_resolves_on_first_complete_and_unsubscribes() {
        let calls: CallLog = Arc::default();
        let handle = Arc::new(ScriptedHandle::new(IceGatheringState::New, calls.clone()));
        let signaling = ScriptedSignaling::answering(calls, fixed_answer());

        let stepper = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            stepper.gathering_tx.send_replace(IceGatheringState::Gathering);
            tokio::time::sleep(Duration::from_millis(5)).await;
            stepper.gathering_tx.send_replace(IceGatheringState::Complete);
        });

        let remote = negotiate(handle.as_ref(), &signaling)
            .await
            .expect("negotiates after gathering settles");

        assert_eq!(remote, fixed_answer());
        assert_eq!(handle.subscriptions.load(Ordering::SeqCst), 1);
        // Resolution dropped the only subscription.
        assert_eq!(handle.gathering_tx.receiver_count(), 0);
    }

    #[tokio::test]
    async fn exchange_sends_the_post_gathering_description() {
        let calls: CallLog = Arc::default();
        let mut handle = ScriptedHandle::new(IceGatheringState::Complete, calls.clone());
        let augmented = SessionDescription::offer("v=0 offer with candidates");
        handle.local_after_gathering = Some(augmented.clone());
        let signaling = ScriptedSignaling::answering(calls, fixed_answer());

        negotiate(&handle, &signaling).await.expect("negotiates");

        assert_eq!(*signaling.received.lock().unwrap(), Some(augmented));
    }

    #[tokio::test]
    async fn offer_failure_prevents_every_later_step() {
        let calls: CallLog = Arc::default();
        let mut handle = ScriptedHandle::new(IceGatheringState::Complete, calls.clone());
        handle.fail_offer = true;
        let signaling = ScriptedSignaling::answering(calls.clone(), fixed_answer());

        let err = negotiate(&handle, &signaling).await.unwrap_err();

        assert!(matches!(err, NegotiateError::OfferCreation(_)));
        assert_eq!(*calls.lock().unwrap(), vec!["create_offer"]);
        assert!(handle.local.lock().unwrap().is_none());
        assert!(handle.remote.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn local_commit_failure_stops_before_exchange() {
        let calls: CallLog = Arc::default();
        let mut handle = ScriptedHandle::new(IceGatheringState::Complete, calls.clone());
        handle.fail_local_commit = true;
        let signaling = ScriptedSignaling::answering(calls.clone(), fixed_answer());

        let err = negotiate(&handle, &signaling).await.unwrap_err();

        assert!(matches!(err, NegotiateError::LocalDescription(_)));
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["create_offer", "set_local_description"]
        );
        assert!(handle.remote.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn signaling_failure_leaves_remote_description_unset() {
        let calls: CallLog = Arc::default();
        let handle = ScriptedHandle::new(IceGatheringState::Complete, calls.clone());
        let signaling = ScriptedSignaling::failing(calls.clone());

        let err = negotiate(&handle, &signaling).await.unwrap_err();

        match err {
            NegotiateError::Signaling(SignalingError::Status(status)) => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            }
            other => panic!("expected signaling status error, got {other}"),
        }
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["create_offer", "set_local_description", "exchange"]
        );
        assert!(handle.remote.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn remote_commit_rejection_surfaces_as_remote_description_error() {
        let calls: CallLog = Arc::default();
        let mut handle = ScriptedHandle::new(IceGatheringState::Complete, calls.clone());
        handle.fail_remote_commit = true;
        let signaling = ScriptedSignaling::answering(calls, fixed_answer());

        let err = negotiate(&handle, &signaling).await.unwrap_err();

        assert!(matches!(err, NegotiateError::RemoteDescription(_)));
        assert!(handle.remote.lock().unwrap().is_none());
        // The answer kind coming back as an offer is the engine's problem to
        // reject; nothing before the commit validates it.
    }

    #[tokio::test]
    async fn returns_the_committed_remote_description() {
        let calls: CallLog = Arc::default();
        let handle = ScriptedHandle::new(IceGatheringState::Complete, calls.clone());
        let pranswer = SessionDescription::pranswer("v=0 provisional");
        let signaling = ScriptedSignaling::answering(calls, pranswer.clone());

        let remote = negotiate(&handle, &signaling).await.expect("negotiates");

        assert_eq!(remote.kind, SdpKind::Pranswer);
        assert_eq!(remote, pranswer);
    }
}
