use aws_config::BehaviorVersion;
use aws_types::region::Region;
use aws_types::SdkConfig;

/// Shared SDK config for every client of one run. The stack config's region
/// always wins over the environment; credentials follow the default chain.
pub async fn load_sdk_config(region: &str, profile: Option<&str>) -> SdkConfig {
    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));

    if let Some(profile) = profile {
        loader = loader.profile_name(profile);
    }

    return loader.load().await;
}
