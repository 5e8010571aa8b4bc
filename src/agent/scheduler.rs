/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! Scheduled-task support: expression parsing and the armed timer handle.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// The fallback interval for unrecognized schedule expressions.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Maps a schedule expression to a periodic interval.
///
/// The dashboard configures a small closed set of intervals, in both the
/// word form and the cron-style spelling its older bots used. Anything
/// else falls back to five minutes with a warning; availability beats
/// strict schedule compliance here.
pub fn parse_schedule(expression: &str) -> Duration {
    let normalized = expression.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "every_5_minutes" | "*/5 * * * *" => Duration::from_secs(5 * 60),
        "every_10_minutes" | "*/10 * * * *" => Duration::from_secs(10 * 60),
        "every_15_minutes" | "*/15 * * * *" => Duration::from_secs(15 * 60),
        "every_30_minutes" | "*/30 * * * *" => Duration::from_secs(30 * 60),
        "hourly" | "every_hour" | "0 * * * *" => Duration::from_secs(60 * 60),
        _ => {
            warn!(expression, "unrecognized schedule expression, defaulting to 5 minutes");
            DEFAULT_INTERVAL
        }
    }
}

/// A live periodic timer. Dropping the handle does not stop the task;
/// call [`ScheduleHandle::disarm`].
#[derive(Debug)]
pub(crate) struct ScheduleHandle {
    token: CancellationToken,
    _task: JoinHandle<()>,
}

impl ScheduleHandle {
    pub(crate) fn disarm(self) {
        self.token.cancel();
    }
}

/// Arms a periodic timer that runs `tick` every `interval` until disarmed.
///
/// The timer takes a duration and a cancellation token rather than any
/// expression syntax; expression parsing stays at the registration
/// boundary.
pub(crate) fn arm<F, Fut>(interval: Duration, tick: F) -> ScheduleHandle
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let token = CancellationToken::new();
    let cancelled = token.clone();
    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancelled.cancelled() => break,
                _ = tokio::time::sleep(interval) => tick().await,
            }
        }
    });
    ScheduleHandle { token, _task: task }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_expressions_map_to_intervals() {
        assert_eq!(parse_schedule("every_5_minutes"), Duration::from_secs(300));
        assert_eq!(parse_schedule("*/15 * * * *"), Duration::from_secs(900));
        assert_eq!(parse_schedule("hourly"), Duration::from_secs(3600));
        assert_eq!(parse_schedule("  Every_30_Minutes "), Duration::from_secs(1800));
    }

    #[test]
    fn unrecognized_expressions_fall_back() {
        assert_eq!(parse_schedule("every 7 minutes"), DEFAULT_INTERVAL);
        assert_eq!(parse_schedule(""), DEFAULT_INTERVAL);
    }
}
