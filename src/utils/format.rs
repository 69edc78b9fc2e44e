//! Elapsed time labels

const SECONDS_PER_MINUTE: u32 = 60;
const SECONDS_PER_HOUR: u32 = 3600;

/// Format an elapsed-seconds count as `HH:MM:SS`.
///
/// Every field is zero-padded to two digits. Hours are not capped, so counts
/// of 100 hours or more produce a wider hour field.
pub fn format_duration(count: u32) -> String {
    let hours = count / SECONDS_PER_HOUR;
    let minutes = (count % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE;
    let seconds = count % SECONDS_PER_MINUTE;

    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}
