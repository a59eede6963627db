//! Coercion of loosely typed usage telemetry into [`TokenUsage`].

use crate::types::TokenUsage;
use serde_json::Value;
use std::fmt::Write as _;

fn field<'a>(value: &'a Value, camel: &str, snake: &str) -> Option<&'a Value> {
    value.get(camel).or_else(|| value.get(snake))
}

/// Read a non-negative count. Strings holding numbers are accepted; anything else is `None`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn count(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f.trunc() as u64)
        }),
        Value::String(s) => s.trim().parse::<f64>().ok().and_then(|f| {
            (f.is_finite() && f >= 0.0).then(|| f.trunc() as u64)
        }),
        _ => None,
    }
}

fn cost(value: Option<&Value>) -> Option<f64> {
    let cost = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (cost.is_finite() && cost >= 0.0).then_some(cost)
}

/// Build a [`TokenUsage`] from arbitrary JSON. Missing or invalid token counts become 0;
/// missing or invalid optional fields are left out. Field names may be camelCase or
/// `snake_case`.
#[must_use]
pub fn coerce_token_usage(value: &Value) -> TokenUsage {
    TokenUsage {
        total_tokens_in: count(field(value, "totalTokensIn", "total_tokens_in")).unwrap_or(0),
        total_tokens_out: count(field(value, "totalTokensOut", "total_tokens_out")).unwrap_or(0),
        total_cache_reads: count(field(value, "totalCacheReads", "total_cache_reads")),
        total_cache_writes: count(field(value, "totalCacheWrites", "total_cache_writes")),
        total_cost: cost(field(value, "totalCost", "total_cost")),
        context_tokens: count(field(value, "contextTokens", "context_tokens")),
    }
}

/// Human-readable one-line summary, e.g. `Tokens: 10 in, 5 out | Cost: $0.0012`.
#[must_use]
pub fn summarize(usage: &TokenUsage) -> String {
    let mut summary = format!(
        "Tokens: {} in, {} out",
        usage.total_tokens_in, usage.total_tokens_out
    );
    if usage.total_cache_reads.is_some() || usage.total_cache_writes.is_some() {
        let _ = write!(
            summary,
            " | Cache: {} read, {} written",
            usage.total_cache_reads.unwrap_or(0),
            usage.total_cache_writes.unwrap_or(0)
        );
    }
    if let Some(context) = usage.context_tokens {
        let _ = write!(summary, " | Context: {context}");
    }
    if let Some(cost) = usage.total_cost {
        let _ = write!(summary, " | Cost: ${cost:.4}");
    }
    summary
}
