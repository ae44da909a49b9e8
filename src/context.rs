use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use std::{fs, io, path::Path};
use validator::Validate;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("File {0} not found")]
    FileNotFound(String),

    #[error("Parsing error: {0}")]
    ParsingError(String),

    #[error("Validation errors: {0}")]
    ValidationError(String),

    #[error("Missing context key `{0}`")]
    MissingKey(String),

    #[error("Context key `{0}` has an unexpected shape")]
    UnexpectedShape(String),

    #[error("Unknown error occurred: {0}")]
    Unknown(String),
}

/// One environment profile, keyed by the `branchName` entry. Kept as a flat
/// map so environments can carry any override for a global key.
pub type EnvironmentRecord = Map<String, Json>;

/// The context document supplied to the tool: per-branch environments layered
/// over one shared globals record.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ContextDocument {
    #[serde(rename = "currentBranch")]
    #[validate(required)]
    pub current_branch: Option<String>,

    #[validate(length(min = 1))]
    pub environments: Vec<EnvironmentRecord>,

    pub globals: Map<String, Json>,
}

/// Read and validate a context document. `.yaml`/`.yml` files are parsed as
/// YAML, everything else as JSON.
pub fn load_document(path: &Path) -> Result<ContextDocument, Error> {
    let contents = match fs::read_to_string(path) {
        Ok(raw_contents) => Ok(raw_contents),
        Err(error) => match error.kind() {
            io::ErrorKind::NotFound => Err(Error::FileNotFound(path.display().to_string())),
            _ => Err(Error::Unknown(error.to_string())),
        },
    }?;

    let is_yaml = matches!(
        path.extension().and_then(|extension| extension.to_str()),
        Some("yaml") | Some("yml")
    );
    let document: ContextDocument = if is_yaml {
        match serde_yaml::from_str(&contents) {
            Ok(data) => Ok(data),
            Err(error) => Err(Error::ParsingError(error.to_string())),
        }?
    } else {
        match serde_json::from_str(&contents) {
            Ok(data) => Ok(data),
            Err(error) => Err(Error::ParsingError(error.to_string())),
        }?
    };

    match document.validate() {
        Ok(_) => (),
        Err(error) => return Err(Error::ValidationError(error.to_string())),
    }

    return Ok(document);
}

/// The resolved configuration for one deployment. Built once per invocation
/// and immutable afterwards; every accessor defers the missing-key failure to
/// the point of dereference.
#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    values: Map<String, Json>,
}

/// Merge globals with the environment whose `branchName` matches the current
/// branch; environment entries win per key. A branch that matches nothing is
/// not an error here. Environments are scanned in document order and the
/// first match wins.
///
/// Async only because the tool entry point is async; the merge itself is
/// synchronous and deterministic.
pub async fn resolve_context(current_branch: &str, document: &ContextDocument) -> Context {
    let environment = document.environments.iter().find(|record| {
        record.get("branchName").and_then(Json::as_str) == Some(current_branch)
    });

    match environment {
        Some(record) => {
            tracing::info!(
                environment = %Json::Object(record.clone()),
                "matched environment for branch {current_branch}"
            );
        }
        None => tracing::warn!("no environment matched branch {current_branch}"),
    }

    let mut values = document.globals.clone();
    if let Some(record) = environment {
        for (key, value) in record {
            values.insert(key.clone(), value.clone());
        }
    }

    return Context { values };
}

impl Context {
    pub fn get(&self, key: &str) -> Option<&Json> {
        return self.values.get(key);
    }

    fn get_str(&self, key: &str) -> Result<&str, Error> {
        match self.values.get(key) {
            Some(Json::String(value)) => Ok(value),
            Some(_) => Err(Error::UnexpectedShape(key.to_string())),
            None => Err(Error::MissingKey(key.to_string())),
        }
    }

    pub fn region(&self) -> Result<&str, Error> {
        return self.get_str("region");
    }

    pub fn account_number(&self) -> Result<&str, Error> {
        return self.get_str("accountNumber");
    }

    pub fn app_name(&self) -> Result<&str, Error> {
        return self.get_str("appName");
    }

    pub fn environment(&self) -> Result<&str, Error> {
        return self.get_str("environment");
    }

    pub fn branch_name(&self) -> Result<&str, Error> {
        return self.get_str("branchName");
    }

    pub fn cidr(&self) -> Result<&str, Error> {
        return self.get_str("cidr");
    }

    pub fn private_subnet_ids(&self) -> Result<Vec<String>, Error> {
        let key = "privateSubnetIds";
        let entries = match self.values.get(key) {
            Some(Json::Array(entries)) => Ok(entries),
            Some(_) => Err(Error::UnexpectedShape(key.to_string())),
            None => Err(Error::MissingKey(key.to_string())),
        }?;

        let mut subnet_ids = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry.as_str() {
                Some(subnet_id) => subnet_ids.push(subnet_id.to_string()),
                None => return Err(Error::UnexpectedShape(key.to_string())),
            }
        }
        return Ok(subnet_ids);
    }

    pub fn agent_activation_key(&self) -> Result<&str, Error> {
        return self.get_str("agentActivationKey");
    }

    pub fn raw_name(&self) -> Result<&str, Error> {
        return self.get_str("raw_name");
    }

    pub fn analytics_name(&self) -> Result<&str, Error> {
        return self.get_str("analytics_name");
    }

    pub fn instrument_credentials_secret(&self) -> Result<&str, Error> {
        return self.get_str("storage_gateway_instrument_credentials");
    }
}
