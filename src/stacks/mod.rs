use crate::context::{self, Context};
use crate::template::{self, StackDescriptor, StackEnv};

pub mod gateway;
pub mod platform;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Context(#[from] context::Error),

    #[error(transparent)]
    Template(#[from] template::Error),
}

/// Shared stack scaffolding: `{environment}-{appName}-stack` naming, the
/// account/region placement and the franchise tag every stack carries.
pub fn stack_descriptor(
    context: &Context,
    artifact_id: &str,
    description: &str,
) -> Result<StackDescriptor, Error> {
    let mut stack = StackDescriptor::new(
        artifact_id.to_string(),
        format!("{}-{}-stack", context.environment()?, context.app_name()?),
        description.to_string(),
        StackEnv {
            region: context.region()?.to_string(),
            account: context.account_number()?.to_string(),
        },
    );
    stack.add_tag("franchise", "VEX");
    return Ok(stack);
}

#[cfg(test)]
pub(crate) mod test_support {
    use serde_json::json;

    use crate::context::{resolve_context, Context};

    /// A fully populated dev context covering both stacks.
    pub async fn dev_context() -> Context {
        let document = serde_json::from_value(json!({
            "currentBranch": "develop",
            "environments": [{
                "branchName": "develop",
                "environment": "dev",
                "cidr": "10.0.0.0/16",
                "privateSubnetIds": ["sn-1", "sn-2"],
                "agentActivationKey": "ACT-KEY-1",
                "storage_gateway_instrument_credentials": "dev/sg/credentials"
            }],
            "globals": {
                "region": "us-east-1",
                "accountNumber": "111",
                "appName": "app",
                "raw_name": "telemetry",
                "analytics_name": "insights"
            }
        }))
        .unwrap();
        resolve_context("develop", &document).await
    }
}

#[cfg(test)]
mod tests {
    use super::stack_descriptor;
    use super::test_support::dev_context;

    #[tokio::test]
    async fn stacks_share_naming_env_and_tags() {
        let context = dev_context().await;
        let stack = stack_descriptor(&context, "test", "a test stack").unwrap();

        assert_eq!("test", stack.artifact_id);
        assert_eq!("dev-app-stack", stack.stack_name);
        assert_eq!("us-east-1", stack.env.region);
        assert_eq!("111", stack.env.account);
        assert_eq!(Some(&String::from("VEX")), stack.tags.get("franchise"));
    }
}
