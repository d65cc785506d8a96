// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{info, warn};

/// Priority for the output callback thread when QMIXER_THREAD_PRIORITY is unset.
const DEFAULT_PRIORITY: u8 = 70;

/// Reads QMIXER_THREAD_PRIORITY (0-99). Out of range or unparseable values fall back to the default.
pub fn callback_thread_priority() -> Option<ThreadPriorityValue> {
    let priority = parse_priority(std::env::var("QMIXER_THREAD_PRIORITY").ok().as_deref());
    ThreadPriorityValue::try_from(priority).ok()
}

fn parse_priority(value: Option<&str>) -> u8 {
    value
        .and_then(|v| v.parse::<u8>().ok())
        .filter(|n| *n < 100)
        .unwrap_or(DEFAULT_PRIORITY)
}

fn is_truthy(value: &str) -> bool {
    value == "1"
        || value.eq_ignore_ascii_case("true")
        || value.eq_ignore_ascii_case("yes")
        || value.eq_ignore_ascii_case("on")
}

/// Whether to attempt SCHED_FIFO for the output callback. Opt out with QMIXER_DISABLE_RT_AUDIO=1.
pub fn rt_audio_enabled() -> bool {
    !std::env::var("QMIXER_DISABLE_RT_AUDIO")
        .map(|v| is_truthy(&v))
        .unwrap_or(false)
}

/// Raises the priority of the calling thread once. Later calls are no-ops.
pub fn configure_audio_thread_priority(
    priority: Option<ThreadPriorityValue>,
    rt_audio: bool,
    priority_set: &mut bool,
) {
    if *priority_set {
        return;
    }
    *priority_set = true;
    let Some(priority) = priority else {
        return;
    };

    let tp = ThreadPriority::Crossplatform(priority);
    let _ = set_current_thread_priority(tp);

    #[cfg(unix)]
    if rt_audio {
        use thread_priority::unix::{
            set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
            ThreadSchedulePolicy,
        };
        match set_thread_priority_and_policy(
            thread_native_id(),
            tp,
            ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
        ) {
            Ok(()) => info!("Enabled SCHED_FIFO for output callback thread"),
            Err(e) => warn!(error = %e, "Unable to set SCHED_FIFO for output callback thread"),
        }
    }
    #[cfg(not(unix))]
    let _ = rt_audio;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_priority() {
        assert_eq!(parse_priority(Some("42")), 42);
        assert_eq!(parse_priority(Some("100")), DEFAULT_PRIORITY);
        assert_eq!(parse_priority(Some("loud")), DEFAULT_PRIORITY);
        assert_eq!(parse_priority(None), DEFAULT_PRIORITY);
    }

    #[test]
    fn test_truthy() {
        assert!(is_truthy("1"));
        assert!(is_truthy("Yes"));
        assert!(is_truthy("ON"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy("off"));
    }

    #[test]
    #[serial_test::serial]
    fn test_rt_audio_opt_out() {
        std::env::set_var("QMIXER_DISABLE_RT_AUDIO", "yes");
        assert!(!rt_audio_enabled());
        std::env::set_var("QMIXER_DISABLE_RT_AUDIO", "0");
        assert!(rt_audio_enabled());
        std::env::remove_var("QMIXER_DISABLE_RT_AUDIO");
        assert!(rt_audio_enabled());
    }

    #[test]
    #[serial_test::serial]
    fn test_priority_from_env() {
        std::env::set_var("QMIXER_THREAD_PRIORITY", "12");
        assert_eq!(callback_thread_priority(), ThreadPriorityValue::try_from(12u8).ok());
        std::env::remove_var("QMIXER_THREAD_PRIORITY");
        assert_eq!(
            callback_thread_priority(),
            ThreadPriorityValue::try_from(DEFAULT_PRIORITY).ok()
        );
    }
}
