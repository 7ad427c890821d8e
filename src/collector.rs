use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Instant;

use anyhow::Result;
use chrono::{NaiveDateTime, Utc};
use prometheus::{Encoder, Gauge, GaugeVec, IntCounter, IntGaugeVec, Opts, Registry, TextEncoder};
use tracing::{error, info, warn};

use crate::helm::ReleaseLister;
use crate::types::{ReleaseRecord, ReleaseStatus};

/// Parse a Helm `updated` timestamp ("2024-01-15 10:30:45.123456789 +0000 UTC")
/// into unix seconds. Everything after the first `.` is dropped, so the
/// timezone offset is discarded rather than corrected for; releases updated
/// in another zone read skewed by that offset.
///
/// Total function: unparseable input falls back to the current wall clock
/// (age reads ~0 for that release on that scrape only) with a warning.
pub fn parse_timestamp(raw: &str) -> f64 {
    let clean = raw.split('.').next().unwrap_or(raw);
    match NaiveDateTime::parse_from_str(clean, "%Y-%m-%d %H:%M:%S") {
        Ok(dt) => dt.and_utc().timestamp() as f64,
        Err(e) => {
            warn!(raw, error = %e, "Failed to parse release timestamp, using current time");
            Utc::now().timestamp() as f64
        }
    }
}

/// Per-release metric families, fully replaced on each successful scrape.
struct ReleaseSeries {
    info: IntGaugeVec,
    status: IntGaugeVec,
    revision: IntGaugeVec,
    age_seconds: GaugeVec,
    releases_total: IntGaugeVec,
}

/// Owns the metric state for Helm releases.
///
/// `refresh` is the single writer; the metrics endpoint reads through
/// `render`. Each refresh replaces every per-release series wholesale, so
/// releases gone from the cluster leave no stale samples behind.
pub struct HelmCollector {
    registry: Registry,
    series: ReleaseSeries,
    scrape_duration: Gauge,
    scrape_errors: IntCounter,
    /// Serializes series swaps against renders: `publish` holds the write
    /// half while it clears and repopulates the families, `render` and
    /// `gather` hold the read half, so a reader never sees a snapshot
    /// mixing two scrapes.
    swap: RwLock<()>,
}

impl HelmCollector {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let series = ReleaseSeries {
            info: IntGaugeVec::new(
                Opts::new("helm_release_info", "Information about Helm releases"),
                &[
                    "name",
                    "namespace",
                    "chart",
                    "app_version",
                    "status",
                    "revision",
                    "updated",
                ],
            )?,
            status: IntGaugeVec::new(
                Opts::new("helm_release_status", "Status of Helm releases"),
                &["name", "namespace", "status"],
            )?,
            revision: IntGaugeVec::new(
                Opts::new(
                    "helm_release_revision",
                    "Current revision number of Helm releases",
                ),
                &["name", "namespace", "chart"],
            )?,
            age_seconds: GaugeVec::new(
                Opts::new(
                    "helm_release_age_seconds",
                    "Age of Helm release in seconds since last update",
                ),
                &["name", "namespace"],
            )?,
            releases_total: IntGaugeVec::new(
                Opts::new(
                    "helm_releases_total",
                    "Total number of Helm releases by status",
                ),
                &["status"],
            )?,
        };

        let scrape_duration = Gauge::new(
            "helm_scrape_duration_seconds",
            "Time spent scraping Helm releases",
        )?;
        let scrape_errors = IntCounter::new(
            "helm_scrape_errors_total",
            "Total number of errors during Helm scraping",
        )?;

        registry.register(Box::new(series.info.clone()))?;
        registry.register(Box::new(series.status.clone()))?;
        registry.register(Box::new(series.revision.clone()))?;
        registry.register(Box::new(series.age_seconds.clone()))?;
        registry.register(Box::new(series.releases_total.clone()))?;
        registry.register(Box::new(scrape_duration.clone()))?;
        registry.register(Box::new(scrape_errors.clone()))?;

        Ok(Self {
            registry,
            series,
            scrape_duration,
            scrape_errors,
            swap: RwLock::new(()),
        })
    }

    /// Run one scrape cycle: list releases, republish the per-release series.
    ///
    /// Never fails to the caller. A scrape-level failure is logged, counted
    /// in `helm_scrape_errors_total`, and leaves the prior per-release
    /// series untouched. Scrape duration is recorded unconditionally.
    pub async fn refresh(&self, lister: &dyn ReleaseLister) {
        let start = Instant::now();

        match lister.list_releases().await {
            Ok(releases) => {
                self.publish(&releases);
                info!(releases = releases.len(), "Updated metrics");
            }
            Err(e) => {
                error!(error = %e, "Failed to update metrics");
                self.scrape_errors.inc();
            }
        }

        let duration = start.elapsed().as_secs_f64();
        self.scrape_duration.set(duration);
        info!(duration_secs = duration, "Scrape completed");
    }

    /// Full replace of every per-release family from a fresh release list.
    fn publish(&self, releases: &[ReleaseRecord]) {
        let _guard = self.swap.write().unwrap();

        self.series.info.reset();
        self.series.status.reset();
        self.series.revision.reset();
        self.series.age_seconds.reset();
        self.series.releases_total.reset();

        let now = Utc::now().timestamp() as f64;
        let mut status_counts: HashMap<ReleaseStatus, i64> = HashMap::new();

        for release in releases {
            let raw_status = release.status.to_lowercase();
            let status = match ReleaseStatus::parse(&raw_status) {
                Some(status) => status,
                None => {
                    warn!(
                        release = %release.name,
                        status = %raw_status,
                        "Unknown Helm status, mapping to unknown"
                    );
                    ReleaseStatus::Unknown
                }
            };

            let revision = release.revision.to_string();
            self.series
                .info
                .with_label_values(&[
                    &release.name,
                    &release.namespace,
                    &release.chart,
                    &release.app_version,
                    status.as_str(),
                    &revision,
                    &release.updated,
                ])
                .set(1);

            // One sample per state in the closed set, 1 for the current one.
            for state in ReleaseStatus::ALL {
                self.series
                    .status
                    .with_label_values(&[&release.name, &release.namespace, state.as_str()])
                    .set(i64::from(state == status));
            }

            self.series
                .revision
                .with_label_values(&[&release.name, &release.namespace, &release.chart])
                .set(release.revision as i64);

            // A release with no `updated` field gets no age sample at all.
            if !release.updated.is_empty() {
                let age = (now - parse_timestamp(&release.updated)).max(0.0);
                self.series
                    .age_seconds
                    .with_label_values(&[&release.name, &release.namespace])
                    .set(age);
            }

            *status_counts.entry(status).or_insert(0) += 1;
        }

        for (status, count) in status_counts {
            self.series
                .releases_total
                .with_label_values(&[status.as_str()])
                .set(count);
        }
    }

    /// Encode the current snapshot in the Prometheus text format.
    pub fn render(&self) -> Result<String> {
        let _guard = self.swap.read().unwrap();
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }

    /// Snapshot of the raw metric families, for inspection in tests.
    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        let _guard = self.swap.read().unwrap();
        self.registry.gather()
    }
}
