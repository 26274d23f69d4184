//! Tele for AWS.

pub use aws_config::SdkConfig;
pub mod cloudfront;

/// Loads the shared AWS configuration from the environment, optionally
/// overriding the region and the credentials profile.
pub async fn load_config(region: Option<String>, profile: Option<String>) -> SdkConfig {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(aws_config::Region::new(region));
    }
    if let Some(profile) = profile {
        loader = loader.profile_name(profile);
    }
    loader.load().await
}
