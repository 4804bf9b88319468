//! Loads device profiles from YAML files and reconciles them with
//! core-metadata: missing profiles are uploaded, and the metadata
//! copy is what ends up in the cache.

use crate::cache::DeviceCache;
use edgeline_api::{
    client::MetadataClient, types::profile::DeviceProfile, Error, Result,
};
use std::sync::Arc;
use tracing::info;

/// Parses one profile document.
pub fn parse(contents: &str) -> Result<DeviceProfile> {
    serde_yaml::from_str(contents)
        .map_err(|e| Error::BadConfig(format!("bad profile: {}", e)))
}

/// Walks `dir` for `*.yaml` files and ensures each profile exists in
/// metadata and in the cache.
pub async fn upload(
    dir: &str,
    cache: &DeviceCache,
    metadata: &Arc<dyn MetadataClient>,
) -> Result<()> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
        Error::BadConfig(format!("can't read profiles dir {}: {}", dir, e))
    })?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::OperationError(format!("{}", e)))?
    {
        let path = entry.path();

        if path.extension().map(|e| e != "yaml").unwrap_or(true) {
            continue;
        }

        let contents = tokio::fs::read_to_string(&path).await?;
        let mut profile = parse(&contents)?;

        match metadata.profile(&profile.name).await? {
            Some(remote) => {
                info!("Found existing profile {}", &remote.name);
                cache.add_profile(remote).await
            }
            None => {
                match metadata.create_profile(&profile).await {
                    Ok(id) => {
                        info!("Created profile {}", &profile.name);
                        profile.id = id;
                        cache.add_profile(profile).await
                    }
                    Err(Error::Conflict(_)) => {
                        // Lost a race with another uploader; their
                        // copy is authoritative.

                        info!(
                            "Skipping already existing profile {}",
                            &profile.name
                        );
                        if let Some(remote) =
                            metadata.profile(&profile.name).await?
                        {
                            cache.add_profile(remote).await
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgeline_api::types::value::PropertyType;

    #[test]
    fn test_parse_yaml_profile() {
        let profile = parse(
            r#"
name: "thermo-profile"
manufacturer: "ACME"
labels: [ "hvac" ]
deviceResources:
  - name: "Temperature"
    description: "ambient temperature"
    properties:
      value: { type: "Int16", readWrite: "R", scale: 0.1, offset: -40.0,
               minimum: -40.0, maximum: 125.0 }
      units: { type: "String", defaultValue: "degC" }
deviceCommands:
  - name: "temperature"
    get:
      - { operation: "get", object: "Temperature" }
"#,
        )
        .unwrap();

        assert_eq!(profile.name, "thermo-profile");

        let res = profile.resource("Temperature").unwrap();

        assert_eq!(
            res.properties.value.value_type,
            Some(PropertyType::Int16)
        );
        assert_eq!(res.properties.value.offset, Some(-40.0));
        assert_eq!(
            profile.operations("temperature", false).unwrap()[0].object,
            "Temperature"
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse("- just\n- a\n- list\n").is_err());
    }
}
