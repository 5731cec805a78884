use std::collections::BTreeMap;

use async_trait::async_trait;
use aws_sdk_secretsmanager::error::ProvideErrorMetadata as _;
use aws_sdk_ssm::error::ProvideErrorMetadata as _;
use serde_yaml::Value;

const PARAMETER_STORE: &str = "ParameterStore";
const SECRETS_MANAGER: &str = "SecretsManager";

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Parameter \"{name}\" {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("Failed to read SSM Parameter Store parameter \"{0}\": {1}")]
    ParameterStore(String, String),

    #[error("Failed to read Secrets Manager secret \"{0}\": {1}")]
    SecretsManager(String, String),
}

/// Where a parameter's final value comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterSource {
    Literal(String),
    ParameterStore(String),
    SecretsManager(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedParameter {
    pub key: String,
    pub value: String,
}

#[async_trait]
pub trait SecretStore {
    async fn parameter_store_value(&self, name: &str) -> Result<String, Error>;

    async fn secrets_manager_value(&self, secret_id: &str) -> Result<String, Error>;
}

pub struct AwsSecretStore {
    ssm: aws_sdk_ssm::Client,
    secrets_manager: aws_sdk_secretsmanager::Client,
}

impl AwsSecretStore {
    pub fn new(sdk_config: &aws_types::SdkConfig) -> Self {
        return Self {
            ssm: aws_sdk_ssm::Client::new(sdk_config),
            secrets_manager: aws_sdk_secretsmanager::Client::new(sdk_config),
        };
    }
}

#[async_trait]
impl SecretStore for AwsSecretStore {
    async fn parameter_store_value(&self, name: &str) -> Result<String, Error> {
        let result = self
            .ssm
            .get_parameter()
            .name(name)
            .with_decryption(true)
            .send()
            .await;

        let output = match result {
            Ok(data) => data,
            Err(error) => {
                let message = match error.as_service_error() {
                    Some(service_error) => service_error
                        .message()
                        .unwrap_or("service error")
                        .to_string(),
                    None => aws_sdk_ssm::error::DisplayErrorContext(&error).to_string(),
                };
                return Err(Error::ParameterStore(name.to_string(), message));
            }
        };

        return match output.parameter().and_then(|parameter| parameter.value()) {
            Some(value) => Ok(value.to_string()),
            None => Err(Error::ParameterStore(
                name.to_string(),
                String::from("parameter has no value"),
            )),
        };
    }

    async fn secrets_manager_value(&self, secret_id: &str) -> Result<String, Error> {
        let result = self
            .secrets_manager
            .get_secret_value()
            .secret_id(secret_id)
            .send()
            .await;

        let output = match result {
            Ok(data) => data,
            Err(error) => {
                let message = match error.as_service_error() {
                    Some(service_error) => service_error
                        .message()
                        .unwrap_or("service error")
                        .to_string(),
                    None => aws_sdk_secretsmanager::error::DisplayErrorContext(&error).to_string(),
                };
                return Err(Error::SecretsManager(secret_id.to_string(), message));
            }
        };

        return match output.secret_string() {
            Some(value) => Ok(value.to_string()),
            None => Err(Error::SecretsManager(
                secret_id.to_string(),
                String::from("secret has no string value"),
            )),
        };
    }
}

/// Classifies a raw `Parameters` value. Scalars become literals, single-key
/// `ParameterStore`/`SecretsManager` mappings become lookups.
pub fn classify(name: &str, value: &Value) -> Result<ParameterSource, Error> {
    let invalid = |reason: &str| Error::InvalidValue {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    return match value {
        Value::String(text) => Ok(ParameterSource::Literal(text.clone())),
        Value::Bool(flag) => Ok(ParameterSource::Literal(flag.to_string())),
        Value::Number(number) => Ok(ParameterSource::Literal(number.to_string())),
        Value::Null => Err(invalid("has no value")),
        Value::Sequence(_) => Err(invalid("must be a scalar, not a list")),
        Value::Tagged(_) => Err(invalid("must not carry a YAML tag")),
        Value::Mapping(mapping) => {
            if mapping.len() != 1 {
                return Err(invalid(
                    "must be a scalar or a single-key ParameterStore/SecretsManager mapping",
                ));
            }

            let (key, reference) = match mapping.iter().next() {
                Some(entry) => entry,
                None => return Err(invalid("has an empty mapping")),
            };
            let reference = match reference {
                Value::String(text) if !text.is_empty() => text.clone(),
                _ => return Err(invalid("must reference its secret by a non-empty string")),
            };

            match key.as_str() {
                Some(PARAMETER_STORE) => Ok(ParameterSource::ParameterStore(reference)),
                Some(SECRETS_MANAGER) => Ok(ParameterSource::SecretsManager(reference)),
                _ => Err(invalid(
                    "mapping key must be either ParameterStore or SecretsManager",
                )),
            }
        }
    };
}

/// Resolves every parameter to a plain string. All values are classified
/// before the first lookup, so a malformed entry never triggers a request.
pub async fn resolve<S>(
    parameters: &BTreeMap<String, Value>,
    store: &S,
) -> Result<Vec<ResolvedParameter>, Error>
where
    S: SecretStore + ?Sized,
{
    let mut sources = Vec::with_capacity(parameters.len());
    for (name, value) in parameters {
        sources.push((name, classify(name, value)?));
    }

    let mut resolved = Vec::with_capacity(sources.len());
    for (name, source) in sources {
        let value = match source {
            ParameterSource::Literal(value) => value,
            ParameterSource::ParameterStore(reference) => {
                tracing::debug!(parameter = %name, %reference, "reading Parameter Store value");
                store.parameter_store_value(&reference).await?
            }
            ParameterSource::SecretsManager(reference) => {
                tracing::debug!(parameter = %name, %reference, "reading Secrets Manager value");
                store.secrets_manager_value(&reference).await?
            }
        };

        resolved.push(ResolvedParameter {
            key: name.clone(),
            value,
        });
    }

    return Ok(resolved);
}
