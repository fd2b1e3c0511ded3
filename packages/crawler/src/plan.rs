//! Subscription-tier limits and the cap-and-flag gates.
//!
//! Gates are pure functions called by the crawl trigger before every
//! invocation; the engine itself only ever consumes already-gated values.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Subscription tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Demo,
    Starter,
    Pro,
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanTier::Demo => write!(f, "demo"),
            PlanTier::Starter => write!(f, "starter"),
            PlanTier::Pro => write!(f, "pro"),
        }
    }
}

impl FromStr for PlanTier {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "demo" => Ok(PlanTier::Demo),
            "starter" => Ok(PlanTier::Starter),
            "pro" => Ok(PlanTier::Pro),
            _ => Err(()),
        }
    }
}

/// Immutable per-tier limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanLimits {
    pub export_max_rows: usize,
    pub crawl_max_depth: usize,
    pub crawl_pages_limit: usize,
    pub crawls_per_month: u32,
}

impl PlanTier {
    pub const fn limits(self) -> PlanLimits {
        match self {
            PlanTier::Demo => PlanLimits {
                export_max_rows: 50,
                crawl_max_depth: 1,
                crawl_pages_limit: 5,
                crawls_per_month: 1,
            },
            PlanTier::Starter => PlanLimits {
                export_max_rows: 1_000,
                crawl_max_depth: 2,
                crawl_pages_limit: 15,
                crawls_per_month: 2,
            },
            PlanTier::Pro => PlanLimits {
                export_max_rows: 10_000,
                crawl_max_depth: 3,
                crawl_pages_limit: 30,
                crawls_per_month: 10,
            },
        }
    }
}

/// Result of gating a crawl request against a plan.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlGate {
    pub max_depth: usize,
    pub pages_limit: usize,
    pub gated: bool,
    pub original_depth: usize,
    pub original_pages_limit: Option<usize>,
}

/// Cap requested crawl parameters to what the plan permits.
pub fn apply_crawl_gate(
    plan: PlanTier,
    requested_depth: usize,
    requested_pages_limit: Option<usize>,
) -> CrawlGate {
    let limits = plan.limits();
    let max_depth = requested_depth.min(limits.crawl_max_depth);
    let pages_limit = requested_pages_limit
        .unwrap_or(limits.crawl_pages_limit)
        .min(limits.crawl_pages_limit);

    let gated = max_depth < requested_depth
        || requested_pages_limit.is_some_and(|requested| pages_limit < requested);

    CrawlGate {
        max_depth,
        pages_limit,
        gated,
        original_depth: requested_depth,
        original_pages_limit: requested_pages_limit,
    }
}

/// Result of gating an export against a plan.
#[derive(Debug, Clone, Serialize)]
pub struct ExportGate {
    pub rows: usize,
    pub gated: bool,
    pub watermark: &'static str,
}

/// Cap export row counts and pick the watermark string.
pub fn apply_export_gate(plan: PlanTier, requested_rows: usize) -> ExportGate {
    let limits = plan.limits();
    let rows = requested_rows.min(limits.export_max_rows);
    let watermark = match plan {
        PlanTier::Demo => "DEMO (max 50 leads)",
        PlanTier::Starter => "STARTER",
        PlanTier::Pro => "PRO",
    };

    ExportGate {
        rows,
        gated: rows < requested_rows,
        watermark,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_caps_depth_and_pages() {
        let gate = apply_crawl_gate(PlanTier::Demo, 5, Some(100));
        assert_eq!(gate.max_depth, 1);
        assert_eq!(gate.pages_limit, 5);
        assert!(gate.gated);
        assert_eq!(gate.original_depth, 5);
        assert_eq!(gate.original_pages_limit, Some(100));
    }

    #[test]
    fn test_gate_within_limits_not_flagged() {
        let gate = apply_crawl_gate(PlanTier::Pro, 2, Some(10));
        assert_eq!(gate.max_depth, 2);
        assert_eq!(gate.pages_limit, 10);
        assert!(!gate.gated);
    }

    #[test]
    fn test_gate_defaults_pages_to_plan_limit() {
        let gate = apply_crawl_gate(PlanTier::Starter, 2, None);
        assert_eq!(gate.pages_limit, 15);
        assert!(!gate.gated);
    }

    #[test]
    fn test_gate_monotonic_for_all_tiers() {
        for plan in [PlanTier::Demo, PlanTier::Starter, PlanTier::Pro] {
            for depth in 0..6 {
                for pages in [None, Some(1), Some(20), Some(500)] {
                    let gate = apply_crawl_gate(plan, depth, pages);
                    assert!(gate.max_depth <= plan.limits().crawl_max_depth);
                    assert!(gate.pages_limit <= plan.limits().crawl_pages_limit);
                    let reduced = gate.max_depth < depth
                        || pages.is_some_and(|p| gate.pages_limit < p);
                    assert_eq!(gate.gated, reduced);
                }
            }
        }
    }

    #[test]
    fn test_export_gate_watermarks() {
        let demo = apply_export_gate(PlanTier::Demo, 200);
        assert_eq!(demo.rows, 50);
        assert!(demo.gated);
        assert_eq!(demo.watermark, "DEMO (max 50 leads)");

        let pro = apply_export_gate(PlanTier::Pro, 200);
        assert_eq!(pro.rows, 200);
        assert!(!pro.gated);
        assert_eq!(pro.watermark, "PRO");
    }

    #[test]
    fn test_plan_tier_parsing() {
        assert_eq!("PRO".parse::<PlanTier>(), Ok(PlanTier::Pro));
        assert_eq!("demo".parse::<PlanTier>(), Ok(PlanTier::Demo));
        assert!("enterprise".parse::<PlanTier>().is_err());
    }
}
