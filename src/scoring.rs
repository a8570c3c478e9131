//! Ranking signal: external (upstream), local (engagement) and their blend.
//!
//! externalScore per kind:
//!
//! ```text
//! baseline
//!   + min(log10(volume + 1) / log10(volume_ceiling + 1) * volume_cap, volume_cap)
//!   + min(secondary / secondary_ceiling * secondary_cap, secondary_cap)
//!   + (trending ? trending_bonus : 0)
//! ```
//!
//! clamped to [0, 100]. Constants live in [`KindScoring::for_kind`].
//!
//! localScore is quality-weighted (70) with a volume bonus (30):
//!
//! ```text
//! quality = min((likes + 2 * bookmarks) / max(views, likes + bookmarks, 1), 1)
//! local   = min(quality * 70 + min(log10(total + 1) / log10(10_001) * 30, 30), 100)
//! ```
//!
//! and is zero until the item has any engagement.
//!
//! finalScore = external * W + local * (1 - W). Everything here is pure.

use crate::model::{ContentKind, EngagementCounters, KindMetrics, Scores};

/// Weight of the external score in the blend.
pub const DEFAULT_EXTERNAL_WEIGHT: f64 = 0.85;

const LOCAL_QUALITY_CAP: f64 = 70.0;
const LOCAL_VOLUME_CAP: f64 = 30.0;
const LOCAL_VOLUME_CEILING: f64 = 10_000.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KindScoring {
    pub baseline: f64,
    /// Zero disables the volume term.
    pub volume_ceiling: f64,
    pub volume_cap: f64,
    pub secondary_ceiling: f64,
    pub secondary_cap: f64,
    pub trending_bonus: f64,
}

impl KindScoring {
    /// Hub listings: downloads up to 10M, likes up to 1k.
    pub const MODEL: KindScoring = KindScoring {
        baseline: 0.0,
        volume_ceiling: 10_000_000.0,
        volume_cap: 70.0,
        secondary_ceiling: 1_000.0,
        secondary_cap: 20.0,
        trending_bonus: 10.0,
    };

    /// Repository listings: stars up to 100k, forks up to 10k.
    pub const REPO: KindScoring = KindScoring {
        baseline: 0.0,
        volume_ceiling: 100_000.0,
        volume_cap: 70.0,
        secondary_ceiling: 10_000.0,
        secondary_cap: 20.0,
        trending_bonus: 10.0,
    };

    /// Channel videos: views up to 10M, likes up to 10k.
    pub const VIDEO: KindScoring = KindScoring {
        baseline: 0.0,
        volume_ceiling: 10_000_000.0,
        volume_cap: 70.0,
        secondary_ceiling: 10_000.0,
        secondary_cap: 20.0,
        trending_bonus: 10.0,
    };

    /// Microblog posts: author followers up to 1M, likes up to 500.
    pub const POST: KindScoring = KindScoring {
        baseline: 0.0,
        volume_ceiling: 1_000_000.0,
        volume_cap: 60.0,
        secondary_ceiling: 500.0,
        secondary_cap: 30.0,
        trending_bonus: 10.0,
    };

    /// Syndication feeds carry no volume metric; comment count at most adds 20.
    pub const ARTICLE: KindScoring = KindScoring {
        baseline: 50.0,
        volume_ceiling: 0.0,
        volume_cap: 0.0,
        secondary_ceiling: 200.0,
        secondary_cap: 20.0,
        trending_bonus: 10.0,
    };

    pub fn for_kind(kind: ContentKind) -> Self {
        match kind {
            ContentKind::Article => Self::ARTICLE,
            ContentKind::Video => Self::VIDEO,
            ContentKind::Model => Self::MODEL,
            ContentKind::Repo => Self::REPO,
            ContentKind::Post => Self::POST,
        }
    }

    pub fn external(&self, volume: u64, secondary: u64, trending: bool) -> f64 {
        let volume_term = if self.volume_ceiling > 0.0 {
            ((volume as f64 + 1.0).log10() / (self.volume_ceiling + 1.0).log10() * self.volume_cap)
                .min(self.volume_cap)
        } else {
            0.0
        };
        let secondary_term = if self.secondary_ceiling > 0.0 {
            (secondary as f64 / self.secondary_ceiling * self.secondary_cap).min(self.secondary_cap)
        } else {
            0.0
        };
        let bonus = if trending { self.trending_bonus } else { 0.0 };
        (self.baseline + volume_term + secondary_term + bonus).clamp(0.0, 100.0)
    }
}

pub fn external_score(metrics: &KindMetrics, trending: bool) -> f64 {
    KindScoring::for_kind(metrics.content_kind()).external(
        metrics.volume(),
        metrics.secondary(),
        trending,
    )
}

pub fn local_score(engagement: &EngagementCounters) -> f64 {
    if engagement.is_empty() {
        return 0.0;
    }
    let likes = engagement.likes() as f64;
    let bookmarks = engagement.bookmarks() as f64;
    let views = engagement.views as f64;

    let denom = views.max(likes + bookmarks).max(1.0);
    let quality = ((likes + 2.0 * bookmarks) / denom).min(1.0);

    let total = likes + bookmarks + views;
    let volume = ((total + 1.0).log10() / (LOCAL_VOLUME_CEILING + 1.0).log10() * LOCAL_VOLUME_CAP)
        .min(LOCAL_VOLUME_CAP);

    (quality * LOCAL_QUALITY_CAP + volume).min(100.0)
}

/// Weight is clamped to [0, 1]; inputs are clamped to [0, 100].
pub fn final_score(external: f64, local: f64, external_weight: f64) -> f64 {
    let w = external_weight.clamp(0.0, 1.0);
    let e = external.clamp(0.0, 100.0);
    let l = local.clamp(0.0, 100.0);
    (e * w + l * (1.0 - w)).clamp(0.0, 100.0)
}

pub fn score(
    metrics: &KindMetrics,
    trending: bool,
    engagement: &EngagementCounters,
    external_weight: f64,
) -> Scores {
    let external = external_score(metrics, trending);
    let local = local_score(engagement);
    Scores {
        external,
        local,
        final_score: final_score(external, local, external_weight),
    }
}

/// Re-blend from stored parts after only the local side changed.
pub fn rescore_local(scores: Scores, engagement: &EngagementCounters, external_weight: f64) -> Scores {
    let local = local_score(engagement);
    Scores {
        external: scores.external,
        local,
        final_score: final_score(scores.external, local, external_weight),
    }
}
