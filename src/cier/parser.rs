//! # CIER Line Parser
//!
//! Decodes `+CIEV:<indicator>,<values>` lines into [`IndicatorEvent`]s.
//!
//! The parser is stateless and never fails: anything that does not match the
//! indicator report syntax is "not an event" and yields `None`.

use tracing::trace;

use super::protocol::*;

/// Decode one modem line captured at `timestamp` (ms since epoch)
///
/// # Arguments
///
/// * `line` - Text line as received from the modem (surrounding whitespace allowed)
/// * `timestamp` - Capture time in milliseconds since the Unix epoch
///
/// # Returns
///
/// * `Option<IndicatorEvent>` - Decoded event, or `None` for malformed or unknown input
///
/// # Examples
///
/// ```
/// use site_survey::cier::parser::parse_line;
/// use site_survey::cier::protocol::Indicator;
///
/// let event = parse_line("+CIEV:0,3", 1_000).unwrap();
/// assert_eq!(event.indicator, Indicator::SignalStrength(3));
/// assert!(parse_line("OK", 1_000).is_none());
/// ```
pub fn parse_line(line: &str, timestamp: i64) -> Option<IndicatorEvent> {
    let (indicator, values) = split_report(line)?;

    let decoded = match indicator {
        INDICATOR_SIGNAL => decode_signal(&values),
        INDICATOR_SERVICE => Some(Indicator::ServiceAvailability(is_set(&values))),
        INDICATOR_ANTENNA => Some(Indicator::AntennaFault(is_set(&values))),
        INDICATOR_SV_BEAM => decode_sv_beam(&values),
        other => {
            trace!("Ignoring unknown indicator {}", other);
            None
        }
    };

    if decoded.is_none() {
        trace!("Dropped malformed indicator line: {}", line.trim());
    }

    decoded.map(|indicator| IndicatorEvent::new(timestamp, indicator))
}

/// Split a report into its indicator number and value fields
fn split_report(line: &str) -> Option<(u8, Vec<&str>)> {
    let (prefix, body) = line.trim().split_once(':')?;
    if prefix.trim() != CIEV_PREFIX {
        return None;
    }

    let mut fields = body.split(',').map(str::trim);
    let indicator = fields.next()?.parse::<u8>().ok()?;
    let values: Vec<&str> = fields.collect();
    if values.is_empty() || values[0].is_empty() {
        return None;
    }

    Some((indicator, values))
}

fn is_set(values: &[&str]) -> bool {
    values[0] == "1"
}

fn decode_signal(values: &[&str]) -> Option<Indicator> {
    let bars = values[0].parse::<u8>().ok()?;
    if bars > SIGNAL_BARS_MAX {
        return None;
    }
    Some(Indicator::SignalStrength(bars))
}

fn decode_sv_beam(values: &[&str]) -> Option<Indicator> {
    if values.len() < SV_BEAM_FIELD_COUNT {
        return None;
    }

    let mut numbers = [0i64; SV_BEAM_FIELD_COUNT];
    for (slot, raw) in numbers.iter_mut().zip(values) {
        *slot = raw.parse::<i64>().ok()?;
    }

    Some(Indicator::SatellitePosition(SvBeamPosition {
        sv_id: u32::try_from(numbers[0]).ok()?,
        beam_id: u32::try_from(numbers[1]).ok()?,
        position_type: PositionType::from_flag(numbers[2]),
        x: numbers[3],
        y: numbers[4],
        z: numbers[5],
    }))
}
