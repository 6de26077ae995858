//! Layered configuration loading
//!
//! Priority (lowest to highest): compiled defaults, optional config file
//! (YAML, TOML or JSON by extension), then `<PREFIX>` environment variables
//! where `__` separates nesting levels, e.g. `HUB_OPCUA__ENDPOINT`.

use std::path::Path;

use errors::{HubError, HubResult};
use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

/// Build the figment without extracting, for callers that need extra layers
pub fn layered_figment<T: Serialize>(
    defaults: &T,
    file: Option<&Path>,
    env_prefix: &str,
) -> HubResult<Figment> {
    let mut figment = Figment::from(Serialized::defaults(defaults));

    if let Some(path) = file {
        if !path.exists() {
            return Err(HubError::FileNotFound(path.display().to_string()));
        }
        info!("Loading configuration file: {}", path.display());
        figment = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => figment.merge(Toml::file(path)),
            Some("json") => figment.merge(Json::file(path)),
            _ => figment.merge(Yaml::file(path)),
        };
    }

    debug!("Applying environment overrides with prefix {}", env_prefix);
    Ok(figment.merge(Env::prefixed(env_prefix).split("__")))
}

/// Load `T` from defaults, an optional file and the environment
pub fn load_layered<T>(defaults: &T, file: Option<&Path>, env_prefix: &str) -> HubResult<T>
where
    T: Serialize + DeserializeOwned,
{
    layered_figment(defaults, file, env_prefix)?
        .extract()
        .map_err(|e| HubError::Configuration(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        server: Server,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Server {
        host: String,
        port: u16,
    }

    fn defaults() -> Sample {
        Sample {
            name: "hubsrv".into(),
            server: Server {
                host: "0.0.0.0".into(),
                port: 9090,
            },
        }
    }

    #[test]
    fn test_defaults_only() {
        Jail::expect_with(|_jail| {
            let loaded: Sample =
                load_layered(&defaults(), None, "SAMPLE_").map_err(|e| e.to_string())?;
            assert_eq!(loaded, defaults());
            Ok(())
        });
    }

    #[test]
    fn test_file_then_env_precedence() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "sample.yaml",
                "name: from-file\nserver:\n  host: 127.0.0.1\n  port: 9100\n",
            )?;
            jail.set_env("SAMPLE_SERVER__PORT", "9200");

            let loaded: Sample = load_layered(&defaults(), Some(Path::new("sample.yaml")), "SAMPLE_")
                .map_err(|e| e.to_string())?;
            assert_eq!(loaded.name, "from-file");
            assert_eq!(loaded.server.host, "127.0.0.1");
            assert_eq!(loaded.server.port, 9200);
            Ok(())
        });
    }

    #[test]
    fn test_toml_file_by_extension() {
        Jail::expect_with(|jail| {
            jail.create_file("sample.toml", "name = \"toml\"\n[server]\nport = 9300\n")?;

            let loaded: Sample = load_layered(&defaults(), Some(Path::new("sample.toml")), "SAMPLE_")
                .map_err(|e| e.to_string())?;
            assert_eq!(loaded.name, "toml");
            assert_eq!(loaded.server.port, 9300);
            assert_eq!(loaded.server.host, "0.0.0.0");
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result: HubResult<Sample> =
            load_layered(&defaults(), Some(Path::new("/nonexistent/hub.yaml")), "SAMPLE_");
        assert!(matches!(result, Err(HubError::FileNotFound(_))));
    }
}
