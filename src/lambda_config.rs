use std::collections::BTreeMap;

use crate::context::{self, Context};
use crate::template::{Code, FunctionSpec, ResourceRef, VpcPlacement};

// Consts
pub const DEFAULT_LAMBDA_MEMORY_MB: u32 = 1024;
pub const DEFAULT_LAMBDA_TIMEOUT_MINS: u32 = 15;
pub const LAMBDA_RUNTIME: &str = "nodejs14.x";

/// Static specification of one function to declare. `timeout_mins` only
/// decides whether the pinned timeout applies; its value is never copied into
/// the output (see `function_properties`).
#[derive(Debug, Clone, PartialEq)]
pub struct LambdaDefinition {
    pub name: &'static str,
    pub memory_mb: Option<u32>,
    pub timeout_mins: Option<u32>,
    pub environment: BTreeMap<String, String>,
    pub is_private: bool,
}

/// The fixed-order table of function definitions for one deployment.
pub fn lambda_definitions(context: &Context) -> Result<Vec<LambdaDefinition>, context::Error> {
    let shared_environment = BTreeMap::from([
        (String::from("REGION"), context.region()?.to_string()),
        (String::from("ENV"), context.environment()?.to_string()),
        (String::from("GIT_BRANCH"), context.branch_name()?.to_string()),
    ]);

    let lambda_definitions = vec![
        LambdaDefinition {
            name: "public-function",
            memory_mb: None,
            timeout_mins: None,
            environment: shared_environment.clone(),
            is_private: false,
        },
        LambdaDefinition {
            name: "private-function",
            memory_mb: Some(2048),
            timeout_mins: Some(5),
            environment: shared_environment,
            is_private: true,
        },
    ];
    return Ok(lambda_definitions);
}

/// Fully resolved, provider-ready properties for one function. Network
/// placement is attached by the assembler when the definition is private and
/// stays `None` otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionProperties {
    pub function_name: String,
    pub entry: String,
    pub runtime: String,
    pub memory_mb: u32,
    pub timeout_mins: u32,
    pub environment: BTreeMap<String, String>,
    pub role: ResourceRef,
    pub layers: Vec<ResourceRef>,
    pub vpc_placement: Option<VpcPlacement>,
}

/// Build the deployment properties for one definition, applying defaults
/// where the definition leaves a field out.
///
/// Any timeout override pins the fixed 15 minute timeout; the override's own
/// value is not honored. Parity with the deployed behavior, tracked as an
/// open policy question in DESIGN.md.
pub fn function_properties(
    definition: &LambdaDefinition,
    lambda_role: &ResourceRef,
    lambda_layer: &ResourceRef,
    context: &Context,
) -> Result<FunctionProperties, context::Error> {
    let function_properties = FunctionProperties {
        function_name: format!(
            "{}-{}-{}",
            context.app_name()?,
            definition.name,
            context.environment()?
        ),
        entry: format!("lambda-handlers/{}.ts", definition.name),
        runtime: LAMBDA_RUNTIME.to_string(),
        memory_mb: definition.memory_mb.unwrap_or(DEFAULT_LAMBDA_MEMORY_MB),
        timeout_mins: if definition.timeout_mins.is_some() {
            15
        } else {
            DEFAULT_LAMBDA_TIMEOUT_MINS
        },
        environment: definition.environment.clone(),
        role: lambda_role.clone(),
        layers: vec![lambda_layer.clone()],
        vpc_placement: None,
    };
    return Ok(function_properties);
}

impl From<FunctionProperties> for FunctionSpec {
    fn from(properties: FunctionProperties) -> Self {
        return FunctionSpec {
            function_name: properties.function_name,
            code: Code::Entry(properties.entry),
            handler: None,
            runtime: properties.runtime,
            memory_mb: Some(properties.memory_mb),
            timeout_secs: properties.timeout_mins * 60,
            environment: properties.environment,
            role: properties.role,
            layers: properties.layers,
            reserved_concurrent_executions: None,
            vpc_placement: properties.vpc_placement,
        };
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;
    use crate::context::{resolve_context, Context};
    use crate::template::ResourceRef;

    async fn test_context() -> Context {
        let document = serde_json::from_value(json!({
            "currentBranch": "develop",
            "environments": [{
                "branchName": "develop",
                "environment": "dev",
            }],
            "globals": { "region": "us-east-1", "appName": "app" }
        }))
        .unwrap();
        resolve_context("develop", &document).await
    }

    fn role() -> ResourceRef {
        ResourceRef {
            logical_id: String::from("LambdaRole"),
        }
    }

    fn layer() -> ResourceRef {
        ResourceRef {
            logical_id: String::from("LambdaLayer"),
        }
    }

    fn definition(memory_mb: Option<u32>, timeout_mins: Option<u32>) -> LambdaDefinition {
        LambdaDefinition {
            name: "public-function",
            memory_mb,
            timeout_mins,
            environment: BTreeMap::new(),
            is_private: false,
        }
    }

    #[tokio::test]
    async fn definition_table_is_fixed_order() {
        let context = test_context().await;
        let definitions = lambda_definitions(&context).unwrap();

        let names: Vec<&str> = definitions.iter().map(|d| d.name).collect();
        assert_eq!(vec!["public-function", "private-function"], names);
        assert_eq!(false, definitions[0].is_private);
        assert_eq!(true, definitions[1].is_private);
        assert_eq!(
            Some("us-east-1"),
            definitions[0].environment.get("REGION").map(String::as_str)
        );
        assert_eq!(
            Some("develop"),
            definitions[0]
                .environment
                .get("GIT_BRANCH")
                .map(String::as_str)
        );
    }

    #[tokio::test]
    async fn memory_defaults_when_absent() {
        let context = test_context().await;
        let properties =
            function_properties(&definition(None, None), &role(), &layer(), &context).unwrap();
        assert_eq!(1024, properties.memory_mb);
    }

    #[tokio::test]
    async fn memory_override_is_honored() {
        let context = test_context().await;
        let properties =
            function_properties(&definition(Some(2048), None), &role(), &layer(), &context)
                .unwrap();
        assert_eq!(2048, properties.memory_mb);
    }

    // The override's own value must not leak through: 5 in, 15 out. A change
    // in either direction needs a tracked policy decision first.
    #[tokio::test]
    async fn timeout_override_pins_fifteen_minutes() {
        let context = test_context().await;
        let properties =
            function_properties(&definition(None, Some(5)), &role(), &layer(), &context).unwrap();
        assert_eq!(15, properties.timeout_mins);
    }

    #[tokio::test]
    async fn timeout_defaults_to_fifteen_minutes() {
        let context = test_context().await;
        let properties =
            function_properties(&definition(None, None), &role(), &layer(), &context).unwrap();
        assert_eq!(15, properties.timeout_mins);
    }

    #[tokio::test]
    async fn names_and_entry_follow_the_conventions() {
        let context = test_context().await;
        let properties =
            function_properties(&definition(None, None), &role(), &layer(), &context).unwrap();

        assert_eq!("app-public-function-dev", properties.function_name);
        assert_eq!("lambda-handlers/public-function.ts", properties.entry);
        assert_eq!("nodejs14.x", properties.runtime);
        assert_eq!(None, properties.vpc_placement);
        assert_eq!(vec![layer()], properties.layers);
    }
}
