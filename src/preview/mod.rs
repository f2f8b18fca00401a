//! Debounced preview recomposition guarded by a monotonically increasing token.

use std::time::{Duration, Instant};

use crate::bridge::{BridgeResult, PreviewImage};

pub const DEFAULT_PREVIEW_DEBOUNCE: Duration = Duration::from_millis(180);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewStatus {
    Idle,
    Pending,
    InFlight { token: u64 },
    Ready(PreviewImage),
    /// Recomposition failed; the last good image (if any) stays on screen.
    Failed {
        message: String,
        last_image: Option<PreviewImage>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewTicket {
    pub token: u64,
}

#[derive(Debug, Clone)]
pub struct PreviewScheduler {
    debounce: Duration,
    deadline: Option<Instant>,
    latest_token: u64,
    last_image: Option<PreviewImage>,
    status: PreviewStatus,
}

impl Default for PreviewScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_PREVIEW_DEBOUNCE)
    }
}

impl PreviewScheduler {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            deadline: None,
            latest_token: 0,
            last_image: None,
            status: PreviewStatus::Idle,
        }
    }

    pub fn status(&self) -> &PreviewStatus {
        &self.status
    }

    pub fn last_image(&self) -> Option<&PreviewImage> {
        self.last_image.as_ref()
    }

    pub fn latest_token(&self) -> u64 {
        self.latest_token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// (Re)arms the debounce window; every new change pushes the deadline out.
    pub fn request(&mut self, now: Instant) {
        self.deadline = Some(now + self.debounce);
        if !matches!(self.status, PreviewStatus::InFlight { .. }) {
            self.status = PreviewStatus::Pending;
        }
    }

    /// Issues a ticket once the debounce window has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<PreviewTicket> {
        let deadline = self.deadline?;
        if now < deadline {
            return None;
        }
        self.deadline = None;
        self.latest_token = self.latest_token.saturating_add(1);
        self.status = PreviewStatus::InFlight {
            token: self.latest_token,
        };
        Some(PreviewTicket {
            token: self.latest_token,
        })
    }

    /// Applies a response. Responses for tokens older than the latest issued are dropped.
    pub fn finish(&mut self, token: u64, result: BridgeResult<PreviewImage>) -> bool {
        if token < self.latest_token {
            tracing::debug!(token, latest = self.latest_token, "discarding stale preview");
            return false;
        }
        let still_pending = self.deadline.is_some();
        match result {
            Ok(image) => {
                self.last_image = Some(image.clone());
                self.status = if still_pending {
                    PreviewStatus::Pending
                } else {
                    PreviewStatus::Ready(image)
                };
            }
            Err(err) => {
                tracing::warn!(token, %err, "preview recomposition failed");
                self.status = PreviewStatus::Failed {
                    message: err.to_string(),
                    last_image: self.last_image.clone(),
                };
            }
        }
        true
    }

    /// Drops pending work and invalidates any response still in flight.
    pub fn reset(&mut self) {
        self.deadline = None;
        self.latest_token = self.latest_token.saturating_add(1);
        self.last_image = None;
        self.status = PreviewStatus::Idle;
    }

    pub fn set_image(&mut self, image: PreviewImage) {
        self.last_image = Some(image.clone());
        self.status = PreviewStatus::Ready(image);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::BridgeError;

    fn image(url: &str) -> PreviewImage {
        PreviewImage {
            url: url.to_string(),
        }
    }

    #[test]
    fn poll_waits_for_debounce_and_rearms_on_new_requests() {
        let start = Instant::now();
        let mut scheduler = PreviewScheduler::default();
        scheduler.request(start);
        assert_eq!(scheduler.poll(start + Duration::from_millis(100)), None);

        scheduler.request(start + Duration::from_millis(100));
        assert_eq!(scheduler.poll(start + Duration::from_millis(200)), None);

        let ticket = scheduler
            .poll(start + Duration::from_millis(280))
            .expect("debounce elapsed");
        assert_eq!(ticket.token, 1);
        assert_eq!(scheduler.poll(start + Duration::from_millis(500)), None);
    }

    #[test]
    fn stale_responses_are_discarded() {
        let start = Instant::now();
        let mut scheduler = PreviewScheduler::default();
        scheduler.request(start);
        let first = scheduler.poll(start + DEFAULT_PREVIEW_DEBOUNCE).expect("ticket");
        scheduler.request(start + DEFAULT_PREVIEW_DEBOUNCE);
        let second = scheduler
            .poll(start + DEFAULT_PREVIEW_DEBOUNCE * 2)
            .expect("ticket");

        assert!(scheduler.finish(second.token, Ok(image("new"))));
        assert!(!scheduler.finish(first.token, Ok(image("old"))));
        assert_eq!(scheduler.status(), &PreviewStatus::Ready(image("new")));
    }

    #[test]
    fn failure_keeps_previous_image_visible() {
        let start = Instant::now();
        let mut scheduler = PreviewScheduler::default();
        scheduler.set_image(image("good"));
        scheduler.request(start);
        let ticket = scheduler.poll(start + DEFAULT_PREVIEW_DEBOUNCE).expect("ticket");

        scheduler.finish(
            ticket.token,
            Err(BridgeError::Rejected {
                operation: "render_preview",
                message: "timeout".to_string(),
            }),
        );
        match scheduler.status() {
            PreviewStatus::Failed {
                message,
                last_image,
            } => {
                assert!(message.contains("timeout"));
                assert_eq!(last_image.as_ref(), Some(&image("good")));
            }
            other => panic!("unexpected status {other:?}"),
        }
        assert_eq!(scheduler.last_image(), Some(&image("good")));
    }

    #[test]
    fn reset_invalidates_in_flight_tokens() {
        let start = Instant::now();
        let mut scheduler = PreviewScheduler::default();
        scheduler.request(start);
        let ticket = scheduler.poll(start + DEFAULT_PREVIEW_DEBOUNCE).expect("ticket");
        scheduler.reset();
        assert!(!scheduler.finish(ticket.token, Ok(image("late"))));
        assert_eq!(scheduler.status(), &PreviewStatus::Idle);
    }
}
