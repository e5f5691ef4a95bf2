//! A countdown timer abstraction for the client
//!
//! Every client operation runs under a countdown timer, and the
//! keep-alive machinery tracks the time since the last send and receive
//! with two more. The platform supplies the time source by implementing
//! [`Countdown`]; the client creates timers through [`Default`], so a
//! default-constructed timer must report itself expired with no time
//! left.

/// A restartable countdown timer.
///
/// # Examples
///
/// ```rust
/// use libmqtt::time::Countdown;
///
/// fn wait_out<T: Countdown>(timer: &mut T) {
///     timer.countdown_ms(250);
///     while !timer.expired() {
///         // do bounded work with timer.left_ms()
///     }
/// }
/// ```
pub trait Countdown {
    /// Restart the countdown with a deadline `ms` milliseconds from now.
    fn countdown_ms(&mut self, ms: u32);

    /// Restart the countdown with a deadline `seconds` seconds from now.
    fn countdown(&mut self, seconds: u32) {
        self.countdown_ms(seconds.saturating_mul(1000));
    }

    /// Milliseconds remaining until the deadline; 0 once expired.
    fn left_ms(&mut self) -> u32;

    /// Whether the deadline has passed.
    ///
    /// A timer that was never armed is expired.
    fn expired(&mut self) -> bool;
}

/// A countdown timer backed by [`std::time::Instant`].
#[cfg(feature = "std")]
#[derive(Debug, Default)]
pub struct StdTimer {
    deadline: Option<std::time::Instant>,
}

#[cfg(feature = "std")]
impl Countdown for StdTimer {
    fn countdown_ms(&mut self, ms: u32) {
        self.deadline =
            Some(std::time::Instant::now() + std::time::Duration::from_millis(ms as u64));
    }

    fn left_ms(&mut self) -> u32 {
        match self.deadline {
            Some(deadline) => {
                let now = std::time::Instant::now();
                deadline
                    .saturating_duration_since(now)
                    .as_millis()
                    .min(u32::MAX as u128) as u32
            }
            None => 0,
        }
    }

    fn expired(&mut self) -> bool {
        self.left_ms() == 0
    }
}
