//! OAuth device authorization flow (RFC 8628).
//!
//! [`DeviceFlowSequencer`] drives `Init -> CodeRequested -> Polling` and
//! ends in `Authorized`, `Denied` or `Expired`. The HTTP exchange sits
//! behind [`DeviceFlowTransport`] so the polling rules can be tested on a
//! paused clock.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::tokens::TokenSet;
use crate::error::{AppError, Result};

/// Device code response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAuthorization {
    pub device_code: String,
    /// Code the user types at `verification_uri`.
    pub user_code: String,
    pub verification_uri: String,
    /// URL with the user code pre-filled, when the provider supplies one.
    pub verification_uri_complete: Option<String>,
    pub expires_in: Duration,
    pub interval: Duration,
}

impl DeviceAuthorization {
    /// Best URL to open in a browser.
    pub fn browser_url(&self) -> &str {
        self.verification_uri_complete
            .as_deref()
            .unwrap_or(&self.verification_uri)
    }
}

/// Outcome of one token poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResponse {
    Authorized(TokenSet),
    AuthorizationPending,
    /// The server may name a new interval; it never lowers ours.
    SlowDown { interval: Option<Duration> },
    ExpiredToken,
    AccessDenied,
    /// Any other OAuth error code, with its description.
    Error(String),
}

/// HTTP side of the device flow.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceFlowTransport: Send + Sync {
    async fn request_code(&self) -> Result<DeviceAuthorization>;

    /// Polls the token endpoint exactly once.
    async fn poll(&self, device_code: &str) -> Result<PollResponse>;
}

/// Observable state of the login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeviceFlowState {
    Init,
    CodeRequested,
    Polling {
        user_code: String,
        verification_uri: String,
        interval_secs: u64,
    },
    Authorized,
    Denied {
        reason: String,
    },
    Expired,
}

impl DeviceFlowState {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Authorized | Self::Denied { .. } | Self::Expired)
    }
}

struct Session {
    state: DeviceFlowState,
    /// Bumped on every new code request and on cancel; responses from an
    /// older epoch are dropped.
    epoch: u64,
    cancel: CancellationToken,
    authorization: Option<DeviceAuthorization>,
    deadline: Option<Instant>,
    interval: Duration,
}

impl Session {
    fn restart(&mut self) -> (u64, CancellationToken) {
        self.cancel.cancel();
        self.epoch += 1;
        self.cancel = CancellationToken::new();
        self.authorization = None;
        self.deadline = None;
        (self.epoch, self.cancel.clone())
    }
}

/// Drives one device-flow login at a time.
pub struct DeviceFlowSequencer {
    transport: Arc<dyn DeviceFlowTransport>,
    slow_down_increment: Duration,
    session: Mutex<Session>,
}

impl DeviceFlowSequencer {
    #[must_use]
    pub fn new(transport: Arc<dyn DeviceFlowTransport>, slow_down_increment: Duration) -> Self {
        Self {
            transport,
            slow_down_increment,
            session: Mutex::new(Session {
                state: DeviceFlowState::Init,
                epoch: 0,
                cancel: CancellationToken::new(),
                authorization: None,
                deadline: None,
                interval: Duration::ZERO,
            }),
        }
    }

    pub fn state(&self) -> DeviceFlowState {
        self.session.lock().state.clone()
    }

    /// Current poll interval; zero before a code has been obtained.
    pub fn interval(&self) -> Duration {
        self.session.lock().interval
    }

    /// Requests a device code and moves to `Polling`.
    ///
    /// Any login already in progress is abandoned.
    pub async fn request_code(&self) -> Result<DeviceAuthorization> {
        let (epoch, cancel) = {
            let mut session = self.session.lock();
            let started = session.restart();
            session.state = DeviceFlowState::CodeRequested;
            started
        };
        debug!("Requesting device code");

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(AppError::AuthCancelled),
            response = self.transport.request_code() => response,
        };

        let mut session = self.session.lock();
        if session.epoch != epoch {
            return Err(AppError::AuthCancelled);
        }
        let authorization = match response {
            Ok(authorization) => authorization,
            Err(err) => {
                session.state = DeviceFlowState::Init;
                return Err(err);
            },
        };

        session.interval = authorization.interval;
        session.deadline = Some(Instant::now() + authorization.expires_in);
        session.state = DeviceFlowState::Polling {
            user_code: authorization.user_code.clone(),
            verification_uri: authorization.verification_uri.clone(),
            interval_secs: authorization.interval.as_secs(),
        };
        session.authorization = Some(authorization.clone());
        info!(
            user_code = %authorization.user_code,
            expires_in = authorization.expires_in.as_secs(),
            "Device code issued"
        );
        Ok(authorization)
    }

    /// Polls until the login reaches a terminal state.
    ///
    /// Waits one interval before every poll. Stops at the first success.
    pub async fn poll_until_complete(&self) -> Result<TokenSet> {
        let (epoch, cancel, device_code, deadline) = {
            let session = self.session.lock();
            match (&session.state, &session.authorization, session.deadline) {
                (DeviceFlowState::Polling { .. }, Some(authorization), Some(deadline)) => (
                    session.epoch,
                    session.cancel.clone(),
                    authorization.device_code.clone(),
                    deadline,
                ),
                _ => return Err(AppError::DeviceFlowNotStarted),
            }
        };

        loop {
            let interval = self.session.lock().interval;
            let wake = Instant::now() + interval;
            if wake >= deadline {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(AppError::AuthCancelled),
                    () = tokio::time::sleep_until(deadline) => {},
                }
                return self.finish(epoch, DeviceFlowState::Expired, AppError::AuthExpired);
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(AppError::AuthCancelled),
                () = tokio::time::sleep_until(wake) => {},
            }

            let response = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(AppError::AuthCancelled),
                response = self.transport.poll(&device_code) => response,
            };
            let current = self.session.lock().epoch;
            if current != epoch {
                debug!("Discarding poll response from a cancelled login");
                return Err(AppError::AuthCancelled);
            }

            match response {
                Ok(PollResponse::Authorized(token)) => {
                    self.transition(epoch, DeviceFlowState::Authorized)?;
                    info!("Device authorization granted");
                    return Ok(token);
                },
                Ok(PollResponse::AuthorizationPending) => {
                    debug!("Authorization pending");
                },
                Ok(PollResponse::SlowDown { interval }) => {
                    self.slow_down(epoch, interval);
                },
                Ok(PollResponse::ExpiredToken) => {
                    return self.finish(epoch, DeviceFlowState::Expired, AppError::AuthExpired);
                },
                Ok(PollResponse::AccessDenied) => {
                    let reason = "access_denied".to_string();
                    return self.finish(
                        epoch,
                        DeviceFlowState::Denied {
                            reason: reason.clone(),
                        },
                        AppError::AuthDenied(reason),
                    );
                },
                Ok(PollResponse::Error(reason)) => {
                    return self.finish(
                        epoch,
                        DeviceFlowState::Denied {
                            reason: reason.clone(),
                        },
                        AppError::AuthDenied(reason),
                    );
                },
                Err(err) => {
                    return self.finish(
                        epoch,
                        DeviceFlowState::Denied {
                            reason: err.to_string(),
                        },
                        err,
                    );
                },
            }
        }
    }

    /// Abandons the login and returns to `Init`.
    pub fn cancel(&self) {
        let mut session = self.session.lock();
        session.restart();
        session.state = DeviceFlowState::Init;
        session.interval = Duration::ZERO;
        info!("Login cancelled");
    }

    fn slow_down(&self, epoch: u64, server_interval: Option<Duration>) {
        let mut session = self.session.lock();
        if session.epoch != epoch {
            return;
        }
        let bumped = session.interval + self.slow_down_increment;
        session.interval = server_interval.map_or(bumped, |server| server.max(bumped));
        let interval_secs = session.interval.as_secs();
        if let DeviceFlowState::Polling {
            interval_secs: current,
            ..
        } = &mut session.state
        {
            *current = interval_secs;
        }
        warn!(interval_secs, "Provider asked to slow down polling");
    }

    fn transition(&self, epoch: u64, next: DeviceFlowState) -> Result<()> {
        let mut session = self.session.lock();
        if session.epoch != epoch {
            return Err(AppError::AuthCancelled);
        }
        debug!(state = ?next, "Device flow transition");
        session.state = next;
        session.authorization = None;
        session.deadline = None;
        Ok(())
    }

    fn finish<T>(&self, epoch: u64, next: DeviceFlowState, err: AppError) -> Result<T> {
        self.transition(epoch, next)?;
        warn!(error = %err, "Device authorization ended without a token");
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    /// Replays poll responses and records when each poll happened.
    struct ScriptedTransport {
        authorization: DeviceAuthorization,
        responses: Mutex<VecDeque<Result<PollResponse>>>,
        polls: Mutex<Vec<Instant>>,
    }

    impl ScriptedTransport {
        fn new(interval: u64, expires_in: u64, responses: Vec<Result<PollResponse>>) -> Arc<Self> {
            Arc::new(Self {
                authorization: DeviceAuthorization {
                    device_code: "device-123".to_string(),
                    user_code: "ABCD-1234".to_string(),
                    verification_uri: "https://github.com/login/device".to_string(),
                    verification_uri_complete: None,
                    expires_in: Duration::from_secs(expires_in),
                    interval: Duration::from_secs(interval),
                },
                responses: Mutex::new(responses.into()),
                polls: Mutex::new(Vec::new()),
            })
        }

        fn poll_count(&self) -> usize {
            self.polls.lock().len()
        }
    }

    #[async_trait]
    impl DeviceFlowTransport for ScriptedTransport {
        async fn request_code(&self) -> Result<DeviceAuthorization> {
            Ok(self.authorization.clone())
        }

        async fn poll(&self, device_code: &str) -> Result<PollResponse> {
            assert_eq!(device_code, "device-123");
            self.polls.lock().push(Instant::now());
            self.responses
                .lock()
                .pop_front()
                .unwrap_or(Ok(PollResponse::AuthorizationPending))
        }
    }

    fn sequencer(transport: Arc<ScriptedTransport>) -> DeviceFlowSequencer {
        DeviceFlowSequencer::new(transport, Duration::from_secs(5))
    }

    #[tokio::test(start_paused = true)]
    async fn slow_down_widens_interval_until_authorized() {
        let transport = ScriptedTransport::new(
            5,
            900,
            vec![
                Ok(PollResponse::AuthorizationPending),
                Ok(PollResponse::SlowDown { interval: None }),
                Ok(PollResponse::Authorized(TokenSet::new("abc"))),
            ],
        );
        let flow = sequencer(Arc::clone(&transport));
        let start = Instant::now();

        flow.request_code().await.unwrap();
        assert!(matches!(flow.state(), DeviceFlowState::Polling { interval_secs: 5, .. }));

        let token = flow.poll_until_complete().await.unwrap();

        assert_eq!(token.access_token, "abc");
        assert_eq!(flow.state(), DeviceFlowState::Authorized);
        assert_eq!(flow.interval(), Duration::from_secs(10));
        let offsets: Vec<u64> = transport
            .polls
            .lock()
            .iter()
            .map(|at| (*at - start).as_secs())
            .collect();
        assert_eq!(offsets, vec![5, 10, 20]);
    }

    #[tokio::test(start_paused = true)]
    async fn no_polls_after_success() {
        let transport = ScriptedTransport::new(
            5,
            900,
            vec![Ok(PollResponse::Authorized(TokenSet::new("abc")))],
        );
        let flow = sequencer(Arc::clone(&transport));
        flow.request_code().await.unwrap();
        flow.poll_until_complete().await.unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.poll_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn server_interval_is_honoured_but_never_lowers() {
        let transport = ScriptedTransport::new(
            5,
            900,
            vec![
                Ok(PollResponse::SlowDown {
                    interval: Some(Duration::from_secs(30)),
                }),
                Ok(PollResponse::SlowDown {
                    interval: Some(Duration::from_secs(1)),
                }),
                Ok(PollResponse::Authorized(TokenSet::new("abc"))),
            ],
        );
        let flow = sequencer(transport);
        flow.request_code().await.unwrap();
        flow.poll_until_complete().await.unwrap();

        assert_eq!(flow.interval(), Duration::from_secs(35));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_token_is_terminal() {
        let transport = ScriptedTransport::new(5, 900, vec![Ok(PollResponse::ExpiredToken)]);
        let flow = sequencer(transport);
        flow.request_code().await.unwrap();

        assert!(matches!(
            flow.poll_until_complete().await,
            Err(AppError::AuthExpired)
        ));
        assert_eq!(flow.state(), DeviceFlowState::Expired);
        assert!(matches!(
            flow.poll_until_complete().await,
            Err(AppError::DeviceFlowNotStarted)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn running_past_expires_in_expires() {
        let transport = ScriptedTransport::new(5, 12, Vec::new());
        let flow = sequencer(Arc::clone(&transport));
        let start = Instant::now();
        flow.request_code().await.unwrap();

        assert!(matches!(
            flow.poll_until_complete().await,
            Err(AppError::AuthExpired)
        ));
        assert_eq!(transport.poll_count(), 2);
        assert_eq!((Instant::now() - start).as_secs(), 12);
        assert_eq!(flow.state(), DeviceFlowState::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn access_denied_and_errors_are_denied() {
        let transport = ScriptedTransport::new(5, 900, vec![Ok(PollResponse::AccessDenied)]);
        let flow = sequencer(transport);
        flow.request_code().await.unwrap();
        assert!(matches!(
            flow.poll_until_complete().await,
            Err(AppError::AuthDenied(_))
        ));
        assert!(matches!(flow.state(), DeviceFlowState::Denied { .. }));

        let transport = ScriptedTransport::new(
            5,
            900,
            vec![Err(AppError::TransportFailure("connection reset".to_string()))],
        );
        let flow = sequencer(transport);
        flow.request_code().await.unwrap();
        assert!(matches!(
            flow.poll_until_complete().await,
            Err(AppError::TransportFailure(_))
        ));
        assert!(matches!(flow.state(), DeviceFlowState::Denied { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_polling_and_returns_to_init() {
        let transport = ScriptedTransport::new(5, 900, Vec::new());
        let flow = Arc::new(sequencer(Arc::clone(&transport)));
        flow.request_code().await.unwrap();

        let polling = {
            let flow = Arc::clone(&flow);
            tokio::spawn(async move { flow.poll_until_complete().await })
        };
        tokio::time::sleep(Duration::from_secs(12)).await;
        flow.cancel();

        assert!(matches!(polling.await.unwrap(), Err(AppError::AuthCancelled)));
        assert_eq!(flow.state(), DeviceFlowState::Init);

        let polls = transport.poll_count();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.poll_count(), polls);
    }

    #[tokio::test]
    async fn failed_code_request_returns_to_init() {
        let mut transport = MockDeviceFlowTransport::new();
        transport
            .expect_request_code()
            .times(1)
            .returning(|| Err(AppError::TransportFailure("dns".to_string())));
        transport.expect_poll().never();
        let flow = DeviceFlowSequencer::new(Arc::new(transport), Duration::from_secs(5));

        assert!(flow.request_code().await.is_err());
        assert_eq!(flow.state(), DeviceFlowState::Init);
        assert!(matches!(
            flow.poll_until_complete().await,
            Err(AppError::DeviceFlowNotStarted)
        ));
    }

    #[test]
    fn browser_url_prefers_complete_uri() {
        let mut authorization = DeviceAuthorization {
            device_code: "d".to_string(),
            user_code: "U".to_string(),
            verification_uri: "https://github.com/login/device".to_string(),
            verification_uri_complete: None,
            expires_in: Duration::from_secs(900),
            interval: Duration::from_secs(5),
        };
        assert_eq!(authorization.browser_url(), "https://github.com/login/device");

        authorization.verification_uri_complete =
            Some("https://github.com/login/device?user_code=U".to_string());
        assert!(authorization.browser_url().ends_with("user_code=U"));
    }
}
