use std::collections::BTreeMap;

use crate::context::Context;
use crate::stacks::{stack_descriptor, Error};
use crate::template::{
    BucketRef, Code, CustomResourceSpec, Effect, FunctionSpec, LogGroupSpec, PolicySpec,
    PolicyStatement, Principal, RemovalPolicy, ResourceKind, ResourceRef, RoleSpec,
    StackDescriptor, Value,
};

pub const DESCRIPTION: &str =
    "CDK stack used to instantiate infrastructure for data platform integration for storage gateways";

const PROVIDER_RUNTIME: &str = "python3.9";
const PROVIDER_HANDLER: &str = "lambda.on_event";
const PROVIDER_TIMEOUT_SECS: u32 = 600;

/// Output of the gateway-agent stage. The file-share stage takes this by
/// reference, so a share can only be declared against a gateway that was
/// declared first.
pub struct GatewayAgent {
    pub resource: ResourceRef,
}

/// The storage-gateway stack: bucket imports, the replication role, and the
/// two custom-resource pipelines (gateway agent, then file share on it).
pub fn assemble(context: &Context) -> Result<StackDescriptor, Error> {
    let mut stack = stack_descriptor(context, "storage-gateway", DESCRIPTION)?;
    let app_name = context.app_name()?.to_string();
    let environment = context.environment()?.to_string();
    let account_number = context.account_number()?.to_string();

    // Import VPC by name
    stack.lookup_vpc(&format!("{environment}-vpc"));

    // Import raw, curated and landing buckets
    let raw_bucket = stack.import_bucket(&format!("{environment}-RAW-{}", context.raw_name()?));
    let curated_bucket = stack.import_bucket(&format!(
        "{environment}-CURATED-{}",
        context.analytics_name()?
    ));
    let landing_bucket = stack.import_bucket(&format!("{environment}-LANDING-TEST"));

    // Storage gateway bucket prefix
    let gateway_s3_prefix = format!("platform/us-east-1/{account_number}/{environment}/ls/hr/sg/");

    declare_replication_role(
        &mut stack,
        &app_name,
        &environment,
        &raw_bucket,
        &curated_bucket,
        &landing_bucket,
    )?;

    // Role shared by both custom-resource provider lambdas
    let custom_resource_role = stack.declare(
        "customResourceRole",
        ResourceKind::Role(RoleSpec {
            role_name: None,
            assumed_by: Principal::Composite(vec![
                Principal::Account(account_number.clone()),
                Principal::Service(String::from("lambda.amazonaws.com")),
            ]),
            description: None,
            managed_policy_arns: vec![],
            inline_policies: vec![PolicySpec {
                policy_name: String::from("customResourceAccess"),
                statements: vec![
                    PolicyStatement {
                        effect: Effect::Allow,
                        actions: vec![
                            String::from("storagegateway:*"),
                            String::from("logs:*"),
                            String::from("secretsmanager:GetSecretValue"),
                            String::from("iam:PassRole"),
                        ],
                        resources: vec![String::from("*")],
                    },
                    PolicyStatement {
                        effect: Effect::Deny,
                        actions: vec![String::from("logs:Delete*")],
                        resources: vec![String::from("*")],
                    },
                ],
            }],
        }),
    )?;

    let agent = declare_gateway_agent(
        &mut stack,
        &app_name,
        &environment,
        &custom_resource_role,
        context,
    )?;

    declare_file_share(
        &mut stack,
        &agent,
        &app_name,
        &environment,
        &account_number,
        &custom_resource_role,
        &landing_bucket,
        &gateway_s3_prefix,
        context,
    )?;

    return Ok(stack);
}

// Role assumed by the gateway to replicate data into the S3 landing zone.
fn declare_replication_role(
    stack: &mut StackDescriptor,
    app_name: &str,
    environment: &str,
    raw_bucket: &BucketRef,
    curated_bucket: &BucketRef,
    landing_bucket: &BucketRef,
) -> Result<ResourceRef, Error> {
    let role = stack.declare(
        "storage-gateway-s3-iam-role",
        ResourceKind::Role(RoleSpec {
            role_name: Some(format!("{environment}-{app_name}-landing")),
            assumed_by: Principal::Service(String::from("storagegateway.amazonaws.com")),
            description: Some(String::from(
                "Role assumed by storage gateway to automate transfer to S3 landing zone",
            )),
            managed_policy_arns: vec![],
            inline_policies: vec![PolicySpec {
                policy_name: String::from("replication-s3-transfer-policy"),
                statements: vec![
                    PolicyStatement {
                        effect: Effect::Allow,
                        actions: vec![
                            String::from("s3:ListBucket"),
                            String::from("s3:GetReplicationConfiguration"),
                            String::from("s3:GetObjectVersionForReplication"),
                            String::from("s3:GetObjectVersionAcl"),
                            String::from("s3:GetObjectVersionTagging"),
                            String::from("s3:GetObjectRetention"),
                            String::from("s3:GetObjectLegalHold"),
                        ],
                        resources: vec![
                            landing_bucket.arn(),
                            format!("{}/*", landing_bucket.arn()),
                            raw_bucket.arn(),
                            format!("{}/*", raw_bucket.arn()),
                            curated_bucket.arn(),
                            format!("{}/*", curated_bucket.arn()),
                        ],
                    },
                    PolicyStatement {
                        effect: Effect::Allow,
                        actions: vec![
                            String::from("s3:ReplicateObject"),
                            String::from("s3:ReplicateDelete"),
                            String::from("s3:ReplicateTags"),
                            String::from("s3:ObjectOwnerOverrideToBucketOwner"),
                            String::from("s3:GetObjectVersionTagging"),
                        ],
                        resources: vec![
                            format!("{}/*", raw_bucket.arn()),
                            format!("{}/*", curated_bucket.arn()),
                        ],
                    },
                ],
            }],
        }),
    )?;
    return Ok(role);
}

// Stage one: the provider lambda, its log group and the custom resource that
// activates the gateway agent.
fn declare_gateway_agent(
    stack: &mut StackDescriptor,
    app_name: &str,
    environment: &str,
    custom_resource_role: &ResourceRef,
    context: &Context,
) -> Result<GatewayAgent, Error> {
    let agent_lambda = stack.declare(
        "custom-agent-lambda",
        ResourceKind::Function(FunctionSpec {
            function_name: format!("{environment}-{app_name}-ch-sg-modify"),
            code: Code::Asset(String::from("../storagegateway")),
            handler: Some(PROVIDER_HANDLER.to_string()),
            runtime: PROVIDER_RUNTIME.to_string(),
            memory_mb: None,
            timeout_secs: PROVIDER_TIMEOUT_SECS,
            environment: BTreeMap::new(),
            role: custom_resource_role.clone(),
            layers: vec![],
            reserved_concurrent_executions: Some(1),
            vpc_placement: None,
        }),
    )?;

    let log_group = stack.declare(
        &format!("{environment}-Storage-Gateway-Log-Group"),
        ResourceKind::LogGroup(LogGroupSpec {
            log_group_name: None,
            retention_days: None,
            removal_policy: RemovalPolicy::Retain,
        }),
    )?;

    let properties = BTreeMap::from([
        (
            String::from("ActivationKey"),
            Value::from(context.agent_activation_key()?),
        ),
        (
            String::from("GatewayName"),
            Value::from(format!("{environment}-CVH-Storage-Gateway")),
        ),
        (String::from("GatewayTimezone"), Value::from("GMT-2:00")),
        (String::from("GatewayRegion"), Value::from("us-east-1")),
        (String::from("GatewayType"), Value::from("FILE_S3")),
        (
            String::from("SecretId"),
            Value::from(context.instrument_credentials_secret()?),
        ),
        (String::from("LogARN"), log_group.arn()),
    ]);

    let resource = stack.declare(
        "sgCustomResource-1",
        ResourceKind::CustomResource(CustomResourceSpec {
            service_token: agent_lambda.arn(),
            properties,
        }),
    )?;

    return Ok(GatewayAgent { resource });
}

// Stage two: the NFS file share on the gateway declared in stage one.
#[allow(clippy::too_many_arguments)]
fn declare_file_share(
    stack: &mut StackDescriptor,
    agent: &GatewayAgent,
    app_name: &str,
    environment: &str,
    account_number: &str,
    custom_resource_role: &ResourceRef,
    landing_bucket: &BucketRef,
    gateway_s3_prefix: &str,
    context: &Context,
) -> Result<ResourceRef, Error> {
    let file_share_role = stack.declare(
        "fileShareRole",
        ResourceKind::Role(RoleSpec {
            role_name: None,
            assumed_by: Principal::Composite(vec![
                Principal::Account(account_number.to_string()),
                Principal::Service(String::from("storagegateway.amazonaws.com")),
            ]),
            description: None,
            managed_policy_arns: vec![],
            inline_policies: vec![PolicySpec {
                policy_name: String::from("fileShareAccess"),
                statements: vec![
                    PolicyStatement {
                        effect: Effect::Allow,
                        actions: vec![
                            String::from("logs:PutLogEvents"),
                            String::from("logs:CreateLogStream"),
                        ],
                        resources: vec![String::from("*")],
                    },
                    PolicyStatement {
                        effect: Effect::Allow,
                        actions: vec![
                            String::from("s3:List*"),
                            String::from("s3:Put*"),
                            String::from("s3:Get*"),
                            String::from("s3:HeadObject"),
                        ],
                        resources: vec![
                            landing_bucket.arn(),
                            format!("{}/*", landing_bucket.arn()),
                        ],
                    },
                ],
            }],
        }),
    )?;

    // The share provider reuses the agent's custom resource role.
    let share_lambda = stack.declare(
        "custom-resource-lambda",
        ResourceKind::Function(FunctionSpec {
            function_name: format!("{environment}-{app_name}-cvh-share-modify"),
            code: Code::Asset(String::from("../share")),
            handler: Some(PROVIDER_HANDLER.to_string()),
            runtime: PROVIDER_RUNTIME.to_string(),
            memory_mb: None,
            timeout_secs: PROVIDER_TIMEOUT_SECS,
            environment: BTreeMap::new(),
            role: custom_resource_role.clone(),
            layers: vec![],
            reserved_concurrent_executions: Some(5),
            vpc_placement: None,
        }),
    )?;

    let audit_log_group = stack.declare(
        "CVH-Log-Group",
        ResourceKind::LogGroup(LogGroupSpec {
            log_group_name: None,
            retention_days: None,
            removal_policy: RemovalPolicy::Retain,
        }),
    )?;

    let properties = BTreeMap::from([
        (String::from("ShareType"), Value::from("NFS")),
        (String::from("GatewayARN"), agent.resource.reference()),
        (String::from("Role"), file_share_role.arn()),
        (
            String::from("LocationARN"),
            Value::from(format!(
                "{}/{}cellavista-hamilton/",
                landing_bucket.arn(),
                gateway_s3_prefix
            )),
        ),
        (String::from("ClientList"), Value::from("10.14.0.0/16")),
        (String::from("FileShareName"), Value::from("CVH-Data")),
        (
            String::from("SecretId"),
            Value::from(context.instrument_credentials_secret()?),
        ),
        (
            String::from("ClientToken"),
            Value::from("sg-ch-CustomShareToken"),
        ),
        (String::from("AuditDestinationARN"), audit_log_group.arn()),
    ]);

    let share = stack.declare(
        "sg-cvh-CustomShare",
        ResourceKind::CustomResource(CustomResourceSpec {
            service_token: share_lambda.arn(),
            properties,
        }),
    )?;
    return Ok(share);
}

#[cfg(test)]
mod tests {
    use super::assemble;
    use crate::stacks::test_support::dev_context;
    use crate::template::{
        CustomResourceSpec, FunctionSpec, Lookup, Principal, ResourceKind, ResourceRef, RoleSpec,
        Value,
    };

    fn custom_resource<'a>(
        stack: &'a crate::template::StackDescriptor,
        logical_id: &str,
    ) -> &'a CustomResourceSpec {
        match &stack.resource(logical_id).unwrap().kind {
            ResourceKind::CustomResource(spec) => spec,
            other => panic!("Expected a custom resource, got {other:?}"),
        }
    }

    fn function<'a>(
        stack: &'a crate::template::StackDescriptor,
        logical_id: &str,
    ) -> &'a FunctionSpec {
        match &stack.resource(logical_id).unwrap().kind {
            ResourceKind::Function(spec) => spec,
            other => panic!("Expected a function, got {other:?}"),
        }
    }

    fn role<'a>(stack: &'a crate::template::StackDescriptor, logical_id: &str) -> &'a RoleSpec {
        match &stack.resource(logical_id).unwrap().kind {
            ResourceKind::Role(spec) => spec,
            other => panic!("Expected a role, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn imports_the_three_buckets_by_name() {
        let context = dev_context().await;
        let stack = assemble(&context).unwrap();

        let buckets: Vec<&str> = stack
            .lookups
            .iter()
            .filter_map(|lookup| match lookup {
                Lookup::Bucket { bucket_name } => Some(bucket_name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(
            vec!["dev-RAW-telemetry", "dev-CURATED-insights", "dev-LANDING-TEST"],
            buckets
        );
    }

    #[tokio::test]
    async fn file_share_references_the_gateway_agent() {
        let context = dev_context().await;
        let stack = assemble(&context).unwrap();

        let share = custom_resource(&stack, "SgCvhCustomShare");
        // Stage two carries stage one's identifier; the engine serializes
        // creation on this reference.
        assert_eq!(
            Some(&Value::Ref(ResourceRef {
                logical_id: String::from("SgCustomResource1")
            })),
            share.properties.get("GatewayARN")
        );
        assert_eq!(
            Some(&Value::GetAtt(
                ResourceRef {
                    logical_id: String::from("FileShareRole")
                },
                "Arn"
            )),
            share.properties.get("Role")
        );
        assert_eq!(
            Some(&Value::Literal(String::from(
                "arn:aws:s3:::dev-LANDING-TEST/platform/us-east-1/111/dev/ls/hr/sg/cellavista-hamilton/"
            ))),
            share.properties.get("LocationARN")
        );
        assert_eq!(
            Some(&Value::Literal(String::from("NFS"))),
            share.properties.get("ShareType")
        );
        assert_eq!(
            Some(&Value::Literal(String::from("10.14.0.0/16"))),
            share.properties.get("ClientList")
        );
    }

    #[tokio::test]
    async fn agent_custom_resource_carries_the_activation_properties() {
        let context = dev_context().await;
        let stack = assemble(&context).unwrap();

        let agent = custom_resource(&stack, "SgCustomResource1");
        assert_eq!(
            Some(&Value::Literal(String::from("ACT-KEY-1"))),
            agent.properties.get("ActivationKey")
        );
        assert_eq!(
            Some(&Value::Literal(String::from("dev-CVH-Storage-Gateway"))),
            agent.properties.get("GatewayName")
        );
        assert_eq!(
            Some(&Value::Literal(String::from("FILE_S3"))),
            agent.properties.get("GatewayType")
        );
        assert_eq!(
            Some(&Value::GetAtt(
                ResourceRef {
                    logical_id: String::from("DevStorageGatewayLogGroup")
                },
                "Arn"
            )),
            agent.properties.get("LogARN")
        );
        assert_eq!(
            Some(&Value::Literal(String::from("dev/sg/credentials"))),
            agent.properties.get("SecretId")
        );
    }

    #[tokio::test]
    async fn both_provider_lambdas_reuse_the_custom_resource_role() {
        let context = dev_context().await;
        let stack = assemble(&context).unwrap();

        let agent_lambda = function(&stack, "CustomAgentLambda");
        let share_lambda = function(&stack, "CustomResourceLambda");

        assert_eq!("dev-app-ch-sg-modify", agent_lambda.function_name);
        assert_eq!("dev-app-cvh-share-modify", share_lambda.function_name);
        assert_eq!("CustomResourceRole", agent_lambda.role.logical_id);
        assert_eq!(agent_lambda.role, share_lambda.role);
        assert_eq!(Some(1), agent_lambda.reserved_concurrent_executions);
        assert_eq!(Some(5), share_lambda.reserved_concurrent_executions);
        assert_eq!("python3.9", agent_lambda.runtime);
    }

    #[tokio::test]
    async fn replication_role_spans_all_three_buckets() {
        let context = dev_context().await;
        let stack = assemble(&context).unwrap();

        let spec = role(&stack, "StorageGatewayS3IamRole");
        assert_eq!(Some("dev-app-landing"), spec.role_name.as_deref());
        assert_eq!(
            Principal::Service(String::from("storagegateway.amazonaws.com")),
            spec.assumed_by
        );

        let statements = &spec.inline_policies[0].statements;
        assert_eq!(2, statements.len());
        assert_eq!(6, statements[0].resources.len());
        assert_eq!(
            vec![
                "arn:aws:s3:::dev-RAW-telemetry/*",
                "arn:aws:s3:::dev-CURATED-insights/*"
            ],
            statements[1].resources
        );
    }
}
