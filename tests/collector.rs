use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use prometheus::proto::MetricType;

use helm_exporter::collector::HelmCollector;
use helm_exporter::helm::{HelmError, ReleaseLister};
use helm_exporter::types::ReleaseRecord;

/// Scripted lister: each `list_releases` call pops the next canned response.
struct FakeLister {
    script: Mutex<VecDeque<Result<Vec<ReleaseRecord>, HelmError>>>,
}

impl FakeLister {
    fn new(script: Vec<Result<Vec<ReleaseRecord>, HelmError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
        }
    }
}

#[async_trait]
impl ReleaseLister for FakeLister {
    async fn list_releases(&self) -> Result<Vec<ReleaseRecord>, HelmError> {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .expect("lister script exhausted")
    }
}

fn record(name: &str, namespace: &str, status: &str, revision: u64, updated: &str) -> ReleaseRecord {
    ReleaseRecord {
        name: name.to_string(),
        namespace: namespace.to_string(),
        chart: format!("{name}-1.0.0"),
        app_version: "1.0".to_string(),
        status: status.to_string(),
        revision,
        updated: updated.to_string(),
    }
}

fn scrape_failure() -> HelmError {
    serde_json::from_str::<Vec<ReleaseRecord>>("not json")
        .unwrap_err()
        .into()
}

/// Value of the first sample in `name` whose labels include all the given
/// pairs, or `None` when no such series exists.
fn metric_value(collector: &HelmCollector, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
    for family in collector.gather() {
        if family.get_name() != name {
            continue;
        }
        'metric: for metric in family.get_metric() {
            for (key, expected) in labels {
                let found = metric
                    .get_label()
                    .iter()
                    .any(|l| l.get_name() == *key && l.get_value() == *expected);
                if !found {
                    continue 'metric;
                }
            }
            return Some(match family.get_field_type() {
                MetricType::COUNTER => metric.get_counter().get_value(),
                _ => metric.get_gauge().get_value(),
            });
        }
    }
    None
}

fn status_count_sum(collector: &HelmCollector) -> f64 {
    collector
        .gather()
        .into_iter()
        .filter(|f| f.get_name() == "helm_releases_total")
        .flat_map(|f| f.get_metric().to_vec())
        .map(|m| m.get_gauge().get_value())
        .sum()
}

#[tokio::test]
async fn aggregate_counts_sum_to_input_size() {
    let collector = HelmCollector::new().unwrap();
    let lister = FakeLister::new(vec![Ok(vec![
        record("app1", "default", "deployed", 1, ""),
        record("app2", "default", "deployed", 4, ""),
        record("app3", "kube-system", "failed", 2, ""),
        record("app4", "default", "wat", 1, ""),
    ])]);

    collector.refresh(&lister).await;

    assert_eq!(status_count_sum(&collector), 4.0);
    assert_eq!(
        metric_value(&collector, "helm_releases_total", &[("status", "deployed")]),
        Some(2.0)
    );
    assert_eq!(
        metric_value(&collector, "helm_releases_total", &[("status", "failed")]),
        Some(1.0)
    );
}

#[tokio::test]
async fn unrecognized_status_is_reported_as_unknown() {
    let collector = HelmCollector::new().unwrap();
    let lister = FakeLister::new(vec![Ok(vec![record(
        "app1",
        "default",
        "Pending-Reboot",
        1,
        "",
    )])]);

    collector.refresh(&lister).await;

    assert_eq!(
        metric_value(
            &collector,
            "helm_release_status",
            &[("name", "app1"), ("status", "unknown")],
        ),
        Some(1.0)
    );
    // The original string appears nowhere, not even lowercased.
    assert_eq!(
        metric_value(&collector, "helm_release_status", &[("status", "pending-reboot")]),
        None
    );
    assert_eq!(
        metric_value(&collector, "helm_releases_total", &[("status", "unknown")]),
        Some(1.0)
    );
    assert_eq!(
        metric_value(&collector, "helm_releases_total", &[("status", "pending-reboot")]),
        None
    );
}

#[tokio::test]
async fn empty_updated_emits_no_age_sample() {
    let recent = format!("{}.0 +0000 UTC", Utc::now().format("%Y-%m-%d %H:%M:%S"));
    let collector = HelmCollector::new().unwrap();
    let lister = FakeLister::new(vec![Ok(vec![
        record("dated", "default", "deployed", 1, &recent),
        record("undated", "default", "deployed", 1, ""),
    ])]);

    collector.refresh(&lister).await;

    assert!(metric_value(&collector, "helm_release_age_seconds", &[("name", "dated")]).is_some());
    assert_eq!(
        metric_value(&collector, "helm_release_age_seconds", &[("name", "undated")]),
        None
    );
}

#[tokio::test]
async fn age_clamps_to_zero_for_future_timestamps() {
    let future = Utc::now() + chrono::Duration::hours(2);
    let updated = format!("{}.0 +0000 UTC", future.format("%Y-%m-%d %H:%M:%S"));
    let collector = HelmCollector::new().unwrap();
    let lister = FakeLister::new(vec![Ok(vec![record(
        "app1", "default", "deployed", 1, &updated,
    )])]);

    collector.refresh(&lister).await;

    assert_eq!(
        metric_value(&collector, "helm_release_age_seconds", &[("name", "app1")]),
        Some(0.0)
    );
}

#[tokio::test]
async fn failed_scrape_keeps_prior_series_and_counts_one_error() {
    let collector = HelmCollector::new().unwrap();
    let lister = FakeLister::new(vec![
        Ok(vec![record("app1", "default", "deployed", 3, "")]),
        Err(scrape_failure()),
    ]);

    collector.refresh(&lister).await;
    assert_eq!(
        metric_value(&collector, "helm_scrape_errors_total", &[]),
        Some(0.0)
    );

    collector.refresh(&lister).await;

    // Prior per-release series are untouched by the failed scrape.
    assert_eq!(
        metric_value(&collector, "helm_release_revision", &[("name", "app1")]),
        Some(3.0)
    );
    assert_eq!(
        metric_value(
            &collector,
            "helm_release_status",
            &[("name", "app1"), ("status", "deployed")],
        ),
        Some(1.0)
    );
    // Exactly one error counted; duration recorded even on failure.
    assert_eq!(
        metric_value(&collector, "helm_scrape_errors_total", &[]),
        Some(1.0)
    );
    let duration = metric_value(&collector, "helm_scrape_duration_seconds", &[]).unwrap();
    assert!(duration > 0.0);
}

#[tokio::test]
async fn single_release_scenario() {
    let json = r#"[{"name":"app1","namespace":"default","chart":"app1-1.0.0","app_version":"1.0","status":"deployed","revision":"3","updated":"2024-01-15 10:30:45.0 +0000 UTC"}]"#;
    let releases: Vec<ReleaseRecord> = serde_json::from_str(json).unwrap();
    let collector = HelmCollector::new().unwrap();
    let lister = FakeLister::new(vec![Ok(releases)]);

    collector.refresh(&lister).await;

    assert_eq!(
        metric_value(
            &collector,
            "helm_release_status",
            &[("name", "app1"), ("namespace", "default"), ("status", "deployed")],
        ),
        Some(1.0)
    );
    assert_eq!(
        metric_value(
            &collector,
            "helm_release_status",
            &[("name", "app1"), ("status", "failed")],
        ),
        Some(0.0)
    );
    assert_eq!(
        metric_value(
            &collector,
            "helm_release_revision",
            &[("name", "app1"), ("chart", "app1-1.0.0")],
        ),
        Some(3.0)
    );
    assert_eq!(
        metric_value(&collector, "helm_releases_total", &[("status", "deployed")]),
        Some(1.0)
    );
    assert_eq!(
        metric_value(
            &collector,
            "helm_release_info",
            &[("name", "app1"), ("status", "deployed"), ("revision", "3")],
        ),
        Some(1.0)
    );

    // 2024-01-15 10:30:45 UTC
    let expected_age = Utc::now().timestamp() as f64 - 1705314645.0;
    let age = metric_value(&collector, "helm_release_age_seconds", &[("name", "app1")]).unwrap();
    assert!((age - expected_age).abs() < 5.0);
}

#[tokio::test]
async fn absent_release_leaves_no_stale_series() {
    let collector = HelmCollector::new().unwrap();
    let lister = FakeLister::new(vec![
        Ok(vec![
            record("app1", "default", "deployed", 1, ""),
            record("app2", "default", "failed", 2, ""),
        ]),
        Ok(vec![record("app2", "default", "deployed", 3, "")]),
    ]);

    collector.refresh(&lister).await;
    collector.refresh(&lister).await;

    assert_eq!(
        metric_value(&collector, "helm_release_revision", &[("name", "app1")]),
        None
    );
    assert_eq!(
        metric_value(&collector, "helm_release_status", &[("name", "app1")]),
        None
    );
    assert_eq!(
        metric_value(&collector, "helm_release_info", &[("name", "app1")]),
        None
    );
    assert_eq!(
        metric_value(&collector, "helm_release_revision", &[("name", "app2")]),
        Some(3.0)
    );
    assert_eq!(
        metric_value(&collector, "helm_releases_total", &[("status", "failed")]),
        None
    );
}

#[tokio::test]
async fn renders_never_mix_two_scrapes() {
    fn generation(namespace: &str) -> Vec<ReleaseRecord> {
        (0..20)
            .map(|i| record(&format!("app{i}"), namespace, "deployed", 1, ""))
            .collect()
    }

    let collector = Arc::new(HelmCollector::new().unwrap());
    let lister = FakeLister::new(vec![Ok(generation("gen1")), Ok(generation("gen2"))]);

    collector.refresh(&lister).await;

    let reader = {
        let collector = collector.clone();
        tokio::spawn(async move {
            let mut outputs = Vec::new();
            for _ in 0..50 {
                outputs.push(collector.render().unwrap());
                tokio::task::yield_now().await;
            }
            outputs
        })
    };

    collector.refresh(&lister).await;

    for text in reader.await.unwrap() {
        let sees_first = text.contains("namespace=\"gen1\"");
        let sees_second = text.contains("namespace=\"gen2\"");
        assert!(
            !(sees_first && sees_second),
            "a render observed releases from two different scrapes"
        );
    }
}
