use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Scale applied when normalising a quantity for one resource name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scale {
    /// Multiply by 1000: CPU-like resources (1000 = one core).
    Milli,
    /// Take the base integer value as-is: bytes, device counts.
    Units,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuantityError {
    #[error("invalid quantity '{raw}': {reason}")]
    Invalid { raw: String, reason: String },
    #[error("quantity '{raw}' overflows 64-bit fixed-point")]
    Overflow { raw: String },
}

/// Per-resource-name scaling table, fixed at construction.
///
/// Unknown resource names fall back to integer units, so custom resources
/// (`example.com/gpu`) count whole devices without any configuration.
#[derive(Debug, Clone)]
pub struct ScalingPolicy {
    scales: BTreeMap<String, Scale>,
}

impl Default for ScalingPolicy {
    fn default() -> Self {
        let mut scales = BTreeMap::new();
        scales.insert("cpu".to_string(), Scale::Milli);
        scales.insert("memory".to_string(), Scale::Units);
        scales.insert("ephemeral-storage".to_string(), Scale::Units);
        Self { scales }
    }
}

impl ScalingPolicy {
    pub fn with_scale(mut self, resource: &str, scale: Scale) -> Self {
        self.scales.insert(resource.to_string(), scale);
        self
    }

    pub fn scale_for(&self, resource: &str) -> Scale {
        self.scales.get(resource).copied().unwrap_or(Scale::Units)
    }

    /// Normalise a human-readable quantity to fixed-point for the given
    /// resource: `"10"` cpu → 10000, `"500m"` cpu → 500, `"512Ki"` memory →
    /// 524288. Fractional results round toward +∞ so usage is never
    /// under-accounted.
    pub fn normalize(&self, resource: &str, raw: &str) -> Result<i64, QuantityError> {
        let dec = parse_quantity(raw)?;
        let scale_mul: i128 = match self.scale_for(resource) {
            Scale::Milli => 1000,
            Scale::Units => 1,
        };
        let overflow = || QuantityError::Overflow {
            raw: raw.to_string(),
        };
        let numer = dec.num.checked_mul(scale_mul).ok_or_else(overflow)?;
        // den > 0 always; ceiling division keeps the rounding direction.
        let value = numer.checked_add(dec.den - 1).ok_or_else(overflow)? / dec.den;
        i64::try_from(value).map_err(|_| overflow())
    }
}

/// A non-negative decimal held exactly: `num / den`.
struct Decimal {
    num: i128,
    den: i128,
}

/// Parse the orchestrator's quantity syntax: an optional `+` sign, decimal
/// digits with at most one point, and an optional suffix (`m`, `k M G T P`,
/// `Ki Mi Gi Ti Pi`). Negative values are rejected; this domain only
/// accounts for non-negative capacity.
fn parse_quantity(raw: &str) -> Result<Decimal, QuantityError> {
    let invalid = |reason: &str| QuantityError::Invalid {
        raw: raw.to_string(),
        reason: reason.to_string(),
    };
    let overflow = || QuantityError::Overflow {
        raw: raw.to_string(),
    };

    let s = raw.trim();
    if s.is_empty() {
        return Err(invalid("empty string"));
    }
    let s = match s.strip_prefix('-') {
        Some(_) => return Err(invalid("negative quantities are not allowed")),
        None => s.strip_prefix('+').unwrap_or(s),
    };

    let split = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());
    let (number, suffix) = s.split_at(split);
    if number.is_empty() {
        return Err(invalid("missing digits"));
    }

    let (suf_num, suf_den): (i128, i128) = match suffix {
        "" => (1, 1),
        "m" => (1, 1000),
        "k" => (1_000, 1),
        "M" => (1_000_000, 1),
        "G" => (1_000_000_000, 1),
        "T" => (1_000_000_000_000, 1),
        "P" => (1_000_000_000_000_000, 1),
        "Ki" => (1 << 10, 1),
        "Mi" => (1 << 20, 1),
        "Gi" => (1 << 30, 1),
        "Ti" => (1 << 40, 1),
        "Pi" => (1 << 50, 1),
        _ => return Err(invalid("unrecognised suffix")),
    };

    let mut parts = number.splitn(2, '.');
    let int_part = parts.next().unwrap_or("");
    let frac_part = parts.next().unwrap_or("");
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid("missing digits"));
    }
    if frac_part.contains('.') {
        return Err(invalid("more than one decimal point"));
    }

    let mut num: i128 = 0;
    let mut den: i128 = 1;
    for c in int_part.chars() {
        num = num
            .checked_mul(10)
            .and_then(|n| n.checked_add((c as u8 - b'0') as i128))
            .ok_or_else(overflow)?;
    }
    for c in frac_part.chars() {
        num = num
            .checked_mul(10)
            .and_then(|n| n.checked_add((c as u8 - b'0') as i128))
            .ok_or_else(overflow)?;
        den = den.checked_mul(10).ok_or_else(overflow)?;
    }

    let num = num.checked_mul(suf_num).ok_or_else(overflow)?;
    let den = den.checked_mul(suf_den).ok_or_else(overflow)?;
    Ok(Decimal { num, den })
}
