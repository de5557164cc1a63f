use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::eligibility::RejectReason;

/// Counter keys returned to a worker that received no job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SkipTag {
    #[serde(rename = "worker_id")]
    WorkerId,
    #[serde(rename = "untrusted")]
    Untrusted,
    #[serde(rename = "max_pixels")]
    MaxPixels,
    #[serde(rename = "step_count")]
    StepCount,
    #[serde(rename = "unsafe_ip")]
    UnsafeIp,
    #[serde(rename = "img2img")]
    Img2Img,
    #[serde(rename = "painting")]
    Painting,
    #[serde(rename = "post-processing")]
    PostProcessing,
    #[serde(rename = "lora")]
    Lora,
    #[serde(rename = "controlnet")]
    Controlnet,
}

impl SkipTag {
    /// Key used on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            SkipTag::WorkerId => "worker_id",
            SkipTag::Untrusted => "untrusted",
            SkipTag::MaxPixels => "max_pixels",
            SkipTag::StepCount => "step_count",
            SkipTag::UnsafeIp => "unsafe_ip",
            SkipTag::Img2Img => "img2img",
            SkipTag::Painting => "painting",
            SkipTag::PostProcessing => "post-processing",
            SkipTag::Lora => "lora",
            SkipTag::Controlnet => "controlnet",
        }
    }
}

/// Per-poll tally of rejection reasons. Zero counters never appear on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkipCounters {
    counts: BTreeMap<SkipTag, u32>,
}

impl SkipCounters {
    pub fn record(&mut self, reason: RejectReason) {
        if let Some(tag) = reason.skip_tag() {
            *self.counts.entry(tag).or_insert(0) += 1;
        }
    }

    pub fn get(&self, tag: SkipTag) -> u32 {
        self.counts.get(&tag).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SkipTag, u32)> + '_ {
        self.counts.iter().map(|(tag, count)| (*tag, *count))
    }
}

impl fmt::Display for SkipCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        for (index, (tag, count)) in self.iter().enumerate() {
            let sep = if index == 0 { "" } else { ", " };
            write!(f, "{sep}{}={count}", tag.as_str())?;
        }
        Ok(())
    }
}

impl Extend<RejectReason> for SkipCounters {
    fn extend<I: IntoIterator<Item = RejectReason>>(&mut self, reasons: I) {
        for reason in reasons {
            self.record(reason);
        }
    }
}
