use crate::annotations::VGPU_MEMORY_RESOURCE;
use crate::error::{Result, SlicerError};
use crate::types::object_name;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;
use tracing::warn;

/// Accelerator memory quantities requested by a pod
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceQuantities {
    /// Accelerator memory in device units
    pub device_memory: u64,
}

impl ResourceQuantities {
    /// Parse a Kubernetes quantity into whole units.
    ///
    /// Accepts an optionally signed decimal number followed by a binary SI
    /// suffix (Ki..Ei), a decimal SI suffix (n..E) or a decimal exponent
    /// (`e3`, `E-2`). Fractions round up to the next whole unit. Negative
    /// values and values above `u64::MAX` are rejected.
    pub fn parse_device_memory(s: &str) -> Result<u64> {
        let raw = s.trim();
        let invalid = |reason: &str| SlicerError::invalid_quantity(raw, reason);

        let (negative, unsigned) = match raw.as_bytes().first() {
            Some(b'-') => (true, &raw[1..]),
            Some(b'+') => (false, &raw[1..]),
            _ => (false, raw),
        };

        let number_end = unsigned
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(unsigned.len());
        let (number, suffix) = unsigned.split_at(number_end);

        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid("missing number"));
        }
        if fraction.contains('.') {
            return Err(invalid("more than one decimal point"));
        }
        let fraction = fraction.trim_end_matches('0');

        let mut mantissa: u128 = 0;
        for digit in whole.bytes().chain(fraction.bytes()) {
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(u128::from(digit - b'0')))
                .ok_or_else(|| invalid("too many digits"))?;
        }

        let (binary_shift, exponent): (u32, i64) = match suffix {
            "" => (0, 0),
            "Ki" => (10, 0),
            "Mi" => (20, 0),
            "Gi" => (30, 0),
            "Ti" => (40, 0),
            "Pi" => (50, 0),
            "Ei" => (60, 0),
            "n" => (0, -9),
            "u" => (0, -6),
            "m" => (0, -3),
            "k" => (0, 3),
            "M" => (0, 6),
            "G" => (0, 9),
            "T" => (0, 12),
            "P" => (0, 15),
            "E" => (0, 18),
            other => match other.strip_prefix(['e', 'E']) {
                Some(exp) => (
                    0,
                    exp.parse::<i64>()
                        .map_err(|_| invalid("unknown suffix"))?,
                ),
                None => return Err(invalid("unknown suffix")),
            },
        };

        if mantissa == 0 {
            return Ok(0);
        }
        if negative {
            return Err(invalid("negative quantity"));
        }

        let overflow = || invalid("exceeds the largest supported value");

        let numerator = mantissa
            .checked_mul(1u128 << binary_shift)
            .ok_or_else(overflow)?;
        let scale = exponent
            .checked_sub(fraction.len() as i64)
            .ok_or_else(overflow)?;
        let power = u32::try_from(scale.unsigned_abs())
            .ok()
            .and_then(|p| 10u128.checked_pow(p));

        let value = if scale >= 0 {
            power
                .and_then(|p| numerator.checked_mul(p))
                .ok_or_else(overflow)?
        } else {
            match power {
                Some(denominator) => numerator.div_ceil(denominator),
                // Denominator beyond u128, so 0 < value < 1
                None => 1,
            }
        };

        u64::try_from(value).map_err(|_| overflow())
    }

    /// Read accelerator memory from a resource map (k8s-openapi format)
    ///
    /// Unset yields `None`; unparseable values yield `Some(Err(..))`.
    pub fn device_memory_from_map(resources: &BTreeMap<String, Quantity>) -> Option<Result<u64>> {
        resources
            .get(VGPU_MEMORY_RESOURCE)
            .map(|q| Self::parse_device_memory(&q.0))
    }

    /// Total accelerator memory requested by all containers of a pod.
    ///
    /// Each container contributes its limit, or its request when it sets no
    /// limit. Unparseable quantities are logged and count as zero.
    pub fn from_pod(pod: &Pod) -> Self {
        let containers = match &pod.spec {
            Some(spec) => &spec.containers,
            None => return Self::default(),
        };

        let mut device_memory = 0u64;

        for container in containers {
            let Some(resources) = &container.resources else {
                continue;
            };

            let limit = resources.limits.as_ref().and_then(Self::device_memory_from_map);
            let value = match limit {
                Some(v) => Some(v),
                None => resources
                    .requests
                    .as_ref()
                    .and_then(Self::device_memory_from_map),
            };

            match value {
                Some(Ok(units)) => device_memory = device_memory.saturating_add(units),
                Some(Err(e)) => warn!(
                    pod = %object_name(&pod.metadata),
                    container = %container.name,
                    error = %e,
                    "Ignoring unparseable accelerator memory quantity"
                ),
                None => {}
            }
        }

        Self { device_memory }
    }
}
