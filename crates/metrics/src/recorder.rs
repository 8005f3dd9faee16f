//! Metrics recorder initialization.

use {anyhow::Result, tracing::info};

/// Handle to the installed recorder.
#[derive(Clone)]
pub struct MetricsHandle {
    #[cfg(feature = "prometheus")]
    prometheus_handle: metrics_exporter_prometheus::PrometheusHandle,
}

impl MetricsHandle {
    /// Render metrics in Prometheus text format.
    ///
    /// Empty when built without the `prometheus` feature.
    #[must_use]
    pub fn render(&self) -> String {
        #[cfg(feature = "prometheus")]
        {
            self.prometheus_handle.render()
        }
        #[cfg(not(feature = "prometheus"))]
        {
            String::new()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetricsRecorderConfig {
    pub enabled: bool,
    /// Labels added to every metric
    pub global_labels: Vec<(String, String)>,
}

/// Install the global recorder. Call once at startup.
///
/// # Errors
///
/// Returns an error if a recorder is already installed or bucket setup fails.
pub fn init_metrics(config: MetricsRecorderConfig) -> Result<MetricsHandle> {
    if !config.enabled {
        info!("metrics collection is disabled");
        return Ok(MetricsHandle {
            #[cfg(feature = "prometheus")]
            prometheus_handle: metrics_exporter_prometheus::PrometheusBuilder::new()
                .build_recorder()
                .handle(),
        });
    }

    #[cfg(feature = "prometheus")]
    {
        let handle = init_prometheus(config)?;
        info!("prometheus metrics recorder installed");
        Ok(MetricsHandle {
            prometheus_handle: handle,
        })
    }

    #[cfg(not(feature = "prometheus"))]
    {
        let _ = config;
        info!("metrics feature not enabled at compile time");
        Ok(MetricsHandle {})
    }
}

#[cfg(feature = "prometheus")]
fn init_prometheus(
    config: MetricsRecorderConfig,
) -> Result<metrics_exporter_prometheus::PrometheusHandle> {
    use {
        crate::{buckets, relay},
        metrics_exporter_prometheus::{Matcher, PrometheusBuilder},
    };

    let mut builder = PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full(relay::FORWARD_DURATION_SECONDS.to_string()),
        &buckets::FORWARD_DURATION,
    )?;

    for (key, value) in config.global_labels {
        builder = builder.add_global_label(key, value);
    }

    // Installs globally without spawning an HTTP listener.
    Ok(builder.install_recorder()?)
}
