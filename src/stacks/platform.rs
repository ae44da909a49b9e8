use crate::context::Context;
use crate::lambda_config::{function_properties, lambda_definitions, LAMBDA_RUNTIME};
use crate::stacks::{stack_descriptor, Error};
use crate::template::{
    Effect, IngressRule, LayerSpec, LogGroupSpec, PolicySpec, PolicyStatement, Principal,
    RemovalPolicy, ResourceKind, RoleSpec, SecurityGroupSpec, StackDescriptor, VpcPlacement,
};

pub const DESCRIPTION: &str =
    "CDK stack used to instantiate infrastructure for data platform integration with Traffic Cop event buses";

const LOG_RETENTION_DAYS: u32 = 30;

/// The lambda/VPC stack: shared execution role and layer, a security group
/// for the private functions, and one function plus log group per definition.
pub fn assemble(context: &Context) -> Result<StackDescriptor, Error> {
    let mut stack = stack_descriptor(context, "platform", DESCRIPTION)?;
    let app_name = context.app_name()?.to_string();
    let environment = context.environment()?.to_string();

    // Import VPC by name
    let vpc = stack.lookup_vpc(&format!("{environment}-vpc"));

    // IAM Lambda role
    let lambda_role = stack.declare(
        "lambda-role",
        ResourceKind::Role(RoleSpec {
            role_name: Some(format!("{app_name}-lambda-role-{environment}")),
            assumed_by: Principal::Service(String::from("lambda.amazonaws.com")),
            description: Some(format!("Lambda role for {app_name}")),
            managed_policy_arns: vec![
                String::from("arn:aws:iam::aws:policy/ReadOnlyAccess"),
                String::from(
                    "arn:aws:iam::aws:policy/service-role/AWSLambdaVPCAccessExecutionRole",
                ),
            ],
            inline_policies: vec![PolicySpec {
                policy_name: String::from("lambdaExecutionAccess"),
                statements: vec![PolicyStatement {
                    effect: Effect::Allow,
                    actions: vec![
                        String::from("logs:CreateLogGroup"),
                        String::from("logs:CreateLogStream"),
                        String::from("logs:DescribeLogGroups"),
                        String::from("logs:DescribeLogStreams"),
                        String::from("logs:PutLogEvents"),
                    ],
                    resources: vec![String::from("*")],
                }],
            }],
        }),
    )?;

    // Import private subnets
    let private_subnets = context
        .private_subnet_ids()?
        .iter()
        .map(|subnet_id| stack.import_subnet(subnet_id))
        .collect::<Vec<_>>();

    // Lambda security group
    let lambda_sg = stack.declare(
        "lambdaSG",
        ResourceKind::SecurityGroup(SecurityGroupSpec {
            group_name: format!("{app_name}-lambda-security-group-{environment}"),
            vpc: vpc.clone(),
            allow_all_outbound: true,
            ingress: vec![IngressRule::all_tcp(
                context.cidr()?,
                "Allow internal VPC traffic",
            )],
        }),
    )?;

    // Lambda layer
    let lambda_layer = stack.declare(
        "lambdaLayer",
        ResourceKind::LayerVersion(LayerSpec {
            asset_path: String::from("lambda-layer"),
            compatible_runtimes: vec![LAMBDA_RUNTIME.to_string()],
            description: format!("Lambda Layer for {app_name}"),
        }),
    )?;

    // One function and one log group per definition
    for definition in lambda_definitions(context)? {
        let mut properties = function_properties(&definition, &lambda_role, &lambda_layer, context)?;
        if definition.is_private {
            properties.vpc_placement = Some(VpcPlacement {
                vpc: vpc.clone(),
                security_groups: vec![lambda_sg.clone()],
                subnets: private_subnets.clone(),
            });
        }

        let log_group_name = format!("/aws/lambda/{}", properties.function_name);
        stack.declare(definition.name, ResourceKind::Function(properties.into()))?;
        stack.declare(
            &format!("fn-{}-log-group", definition.name),
            ResourceKind::LogGroup(LogGroupSpec {
                log_group_name: Some(log_group_name),
                retention_days: Some(LOG_RETENTION_DAYS),
                removal_policy: RemovalPolicy::Destroy,
            }),
        )?;
    }

    return Ok(stack);
}
