//! Real-time metrics subscriptions of CloudFront distributions.
//!
//! A distribution has at most one subscription, so the distribution id is
//! also the identifier of the subscription.
use aws_sdk_cloudfront::types::{
    MonitoringSubscription as SdkMonitoringSubscription,
    RealtimeMetricsSubscriptionConfig as SdkRealtimeMetricsSubscriptionConfig,
    RealtimeMetricsSubscriptionStatus,
};
use snafu::prelude::*;

use super::{
    api::Found,
    schema::{Attribute, Kind, Schema},
    BuildSnafu, CloudFront, Error, IncompleteSnafu, InvalidSnafu, UnresolvedSnafu,
};
use crate::{remote::Remote, HasDependencies, Resource};

pub const SCHEMA: Schema = Schema {
    type_name: "aws_cloudfront_monitoring_subscription",
    attributes: &[
        Attribute::required("distribution_id", Kind::String).force_new(),
        Attribute::required("monitoring_subscription", Kind::Block)
            .max_items(1)
            .with(&[
                Attribute::required("realtime_metrics_subscription_config", Kind::Block)
                    .max_items(1)
                    .with(&[Attribute::required(
                        "realtime_metrics_subscription_status",
                        Kind::String,
                    )]),
            ]),
    ],
};

wire_enum! {
    SubscriptionStatus => RealtimeMetricsSubscriptionStatus {
        Enabled = "Enabled",
        Disabled = "Disabled",
    }
}

/// A monitoring subscription definition.
///
/// The distribution id may be a literal or the output of another resource.
#[derive(Clone, Debug, PartialEq, HasDependencies, serde::Serialize, serde::Deserialize)]
pub struct MonitoringSubscription {
    pub distribution_id: Remote<String>,
    #[tele(skip)]
    pub monitoring_subscription: Subscription,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Subscription {
    pub realtime_metrics_subscription_config: RealtimeMetricsSubscriptionConfig,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RealtimeMetricsSubscriptionConfig {
    pub realtime_metrics_subscription_status: SubscriptionStatus,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RemoteMonitoringSubscription {
    pub distribution_id: String,
    pub monitoring_subscription: Subscription,
}

impl Subscription {
    pub fn new(status: SubscriptionStatus) -> Self {
        Subscription {
            realtime_metrics_subscription_config: RealtimeMetricsSubscriptionConfig {
                realtime_metrics_subscription_status: status,
            },
        }
    }

    pub fn status(&self) -> SubscriptionStatus {
        self.realtime_metrics_subscription_config
            .realtime_metrics_subscription_status
    }

    pub fn expand(&self) -> Result<SdkMonitoringSubscription, Error> {
        let config = SdkRealtimeMetricsSubscriptionConfig::builder()
            .realtime_metrics_subscription_status(self.status().into())
            .build()
            .context(BuildSnafu {
                what: "RealtimeMetricsSubscriptionConfig",
            })?;
        Ok(SdkMonitoringSubscription::builder()
            .realtime_metrics_subscription_config(config)
            .build())
    }

    pub fn flatten(subscription: &SdkMonitoringSubscription) -> Result<Self, Error> {
        let config = subscription
            .realtime_metrics_subscription_config()
            .context(IncompleteSnafu {
                what: "MonitoringSubscription",
                field: "RealtimeMetricsSubscriptionConfig",
            })?;
        Ok(Self::new(
            config.realtime_metrics_subscription_status().try_into()?,
        ))
    }
}

impl MonitoringSubscription {
    pub fn new(distribution_id: impl Into<Remote<String>>, status: SubscriptionStatus) -> Self {
        Self {
            distribution_id: distribution_id.into(),
            monitoring_subscription: Subscription::new(status),
        }
    }

    fn distribution_id(&self) -> Result<String, Error> {
        self.distribution_id
            .get()
            .map_err(Box::new)
            .context(UnresolvedSnafu {
                attribute: "distribution_id",
            })
    }

    async fn get(
        &self,
        provider: &CloudFront,
        distribution_id: &str,
    ) -> Result<Option<RemoteMonitoringSubscription>, Error> {
        let Some(subscription) = provider
            .api()
            .get_monitoring_subscription(distribution_id)
            .await
            .found()?
        else {
            return Ok(None);
        };
        Ok(Some(RemoteMonitoringSubscription {
            distribution_id: distribution_id.to_owned(),
            monitoring_subscription: Subscription::flatten(&subscription)?,
        }))
    }

    async fn put(&self, provider: &CloudFront) -> Result<RemoteMonitoringSubscription, Error> {
        let distribution_id = self.distribution_id()?;
        provider
            .api()
            .create_monitoring_subscription(
                &distribution_id,
                self.monitoring_subscription.expand()?,
            )
            .await?;
        log::info!(
            "  realtime metrics of distribution {distribution_id} are {}",
            self.monitoring_subscription.status()
        );
        self.get(provider, &distribution_id)
            .await?
            .context(IncompleteSnafu {
                what: "CreateMonitoringSubscription",
                field: "MonitoringSubscription",
            })
    }
}

impl Resource for MonitoringSubscription {
    type Provider = CloudFront;
    type Error = Error;
    type Output = RemoteMonitoringSubscription;

    fn remote_id(output: &Self::Output) -> String {
        output.distribution_id.clone()
    }

    fn should_replace(&self, previous: &Self) -> bool {
        match (self.distribution_id.get(), previous.distribution_id.get()) {
            (Ok(next), Ok(previous)) => next != previous,
            _ => self.distribution_id.depends_on() != previous.distribution_id.depends_on(),
        }
    }

    fn has_drifted(&self, remote: &Self::Output) -> bool {
        self.monitoring_subscription != remote.monitoring_subscription
    }

    async fn create(&self, provider: &Self::Provider) -> Result<Self::Output, Self::Error> {
        self.put(provider).await
    }

    async fn read(
        &self,
        provider: &Self::Provider,
        id: &str,
    ) -> Result<Option<Self::Output>, Self::Error> {
        // the id is the distribution, so it must be the one declared
        if let Ok(declared) = self.distribution_id.get() {
            ensure!(
                declared == id,
                InvalidSnafu {
                    attribute: "distribution_id",
                    message: format!("'{declared}' does not match the subscription id '{id}'"),
                }
            );
        }
        let subscription = self.get(provider, id).await?;
        if subscription.is_none() {
            log::warn!("CloudFront Monitoring Subscription ({id}) not found");
        }
        Ok(subscription)
    }

    async fn update(
        &self,
        provider: &Self::Provider,
        _previous_local: &Self,
        _previous_remote: &Self::Output,
    ) -> Result<Self::Output, Self::Error> {
        self.put(provider).await
    }

    async fn delete(
        &self,
        provider: &Self::Provider,
        previous_remote: &Self::Output,
    ) -> Result<(), Self::Error> {
        let id = &previous_remote.distribution_id;
        if provider
            .api()
            .delete_monitoring_subscription(id)
            .await
            .found()?
            .is_none()
        {
            log::warn!("  monitoring subscription of {id} was already deleted");
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn literal_distribution_ids_have_no_dependencies() {
        let subscription =
            MonitoringSubscription::new("E2QWRUHAPOMQZL".to_owned(), SubscriptionStatus::Enabled);
        assert!(subscription.dependencies().into_iter().next().is_none());
        assert_eq!("E2QWRUHAPOMQZL", subscription.distribution_id().unwrap());
    }

    #[test]
    fn moving_to_another_distribution_replaces() {
        let previous = MonitoringSubscription::new("E1".to_owned(), SubscriptionStatus::Enabled);
        let disabled = MonitoringSubscription::new("E1".to_owned(), SubscriptionStatus::Disabled);
        let moved = MonitoringSubscription::new("E2".to_owned(), SubscriptionStatus::Enabled);
        assert!(!disabled.should_replace(&previous));
        assert!(moved.should_replace(&previous));
    }

    #[test]
    fn stored_form_is_flat() {
        let subscription =
            MonitoringSubscription::new("E1".to_owned(), SubscriptionStatus::Disabled);
        assert_eq!(
            serde_json::json!({
                "distribution_id": "E1",
                "monitoring_subscription": {
                    "realtime_metrics_subscription_config": {
                        "realtime_metrics_subscription_status": "Disabled"
                    }
                }
            }),
            serde_json::to_value(&subscription).unwrap()
        );
    }
}
