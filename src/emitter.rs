use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value as Json};

use crate::template::{
    Code, CustomResourceSpec, Effect, FunctionSpec, LayerSpec, LogGroupSpec, Lookup, Principal,
    RemovalPolicy, Resource, ResourceKind, RoleSpec, SecurityGroupSpec, StackDescriptor, Value,
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Write error for {path}: {message}")]
    WriteError { path: String, message: String },
}

/// Translates a stack descriptor into the deployment engine's format. The
/// descriptor layer never serializes itself, so the target format can be
/// swapped without touching the assemblers.
pub trait Emitter {
    fn emit(&self, stack: &StackDescriptor) -> Result<String, Error>;
}

/// Emits a CloudFormation-style JSON template. Symbolic lookups land under
/// `Metadata` for the engine to verify before provisioning.
pub struct CloudFormationEmitter;

impl Emitter for CloudFormationEmitter {
    fn emit(&self, stack: &StackDescriptor) -> Result<String, Error> {
        let mut resources = Map::new();
        for resource in &stack.resources {
            resources.insert(resource.logical_id.clone(), render_resource(resource));
        }

        let template = json!({
            "Description": &stack.description,
            "Metadata": {
                "StackName": &stack.stack_name,
                "Env": {
                    "Region": &stack.env.region,
                    "Account": &stack.env.account,
                },
                "Tags": &stack.tags,
                "Lookups": stack.lookups.iter().map(render_lookup).collect::<Vec<_>>(),
            },
            "Resources": resources,
        });

        return match serde_json::to_string_pretty(&template) {
            Ok(contents) => Ok(contents),
            Err(error) => Err(Error::SerializationError(error.to_string())),
        };
    }
}

/// Emit a stack and write it to `<out_dir>/<artifactId>.template.json`.
pub fn write_template(
    emitter: &dyn Emitter,
    stack: &StackDescriptor,
    out_dir: &Path,
) -> Result<PathBuf, Error> {
    let contents = emitter.emit(stack)?;
    let path = out_dir.join(format!("{}.template.json", stack.artifact_id));

    let io_error = |error: std::io::Error| Error::WriteError {
        path: path.display().to_string(),
        message: error.to_string(),
    };
    fs::create_dir_all(out_dir).map_err(io_error)?;
    fs::write(&path, contents).map_err(io_error)?;
    return Ok(path);
}

fn render_lookup(lookup: &Lookup) -> Json {
    match lookup {
        Lookup::Vpc { vpc_name } => json!({ "Vpc": { "VpcName": vpc_name } }),
        Lookup::Subnet { subnet_id } => json!({ "Subnet": { "SubnetId": subnet_id } }),
        Lookup::Bucket { bucket_name } => json!({ "Bucket": { "BucketName": bucket_name } }),
    }
}

fn render_value(value: &Value) -> Json {
    match value {
        Value::Literal(literal) => json!(literal),
        Value::Ref(reference) => json!({ "Ref": &reference.logical_id }),
        Value::GetAtt(reference, attribute) => {
            json!({ "Fn::GetAtt": [&reference.logical_id, attribute] })
        }
        Value::List(values) => Json::Array(values.iter().map(render_value).collect()),
    }
}

fn render_resource(resource: &Resource) -> Json {
    match &resource.kind {
        ResourceKind::Role(spec) => render_role(spec),
        ResourceKind::SecurityGroup(spec) => render_security_group(spec),
        ResourceKind::LayerVersion(spec) => render_layer(spec),
        ResourceKind::Function(spec) => render_function(spec),
        ResourceKind::LogGroup(spec) => render_log_group(spec),
        ResourceKind::CustomResource(spec) => render_custom_resource(spec),
    }
}

fn render_effect(effect: Effect) -> &'static str {
    match effect {
        Effect::Allow => "Allow",
        Effect::Deny => "Deny",
    }
}

fn render_principal(principal: &Principal) -> Json {
    match principal {
        Principal::Service(service) => json!({ "Service": service }),
        Principal::Account(account) => json!({ "AWS": format!("arn:aws:iam::{account}:root") }),
        Principal::Composite(principals) => {
            let mut merged = Map::new();
            for principal in principals {
                if let Json::Object(entries) = render_principal(principal) {
                    for (key, value) in entries {
                        merged.insert(key, value);
                    }
                }
            }
            Json::Object(merged)
        }
    }
}

fn render_role(spec: &RoleSpec) -> Json {
    let mut properties = Map::new();
    properties.insert(
        String::from("AssumeRolePolicyDocument"),
        json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Principal": render_principal(&spec.assumed_by),
                "Action": "sts:AssumeRole",
            }],
        }),
    );
    if let Some(role_name) = &spec.role_name {
        properties.insert(String::from("RoleName"), json!(role_name));
    }
    if let Some(description) = &spec.description {
        properties.insert(String::from("Description"), json!(description));
    }
    if !spec.managed_policy_arns.is_empty() {
        properties.insert(
            String::from("ManagedPolicyArns"),
            json!(&spec.managed_policy_arns),
        );
    }
    if !spec.inline_policies.is_empty() {
        let policies: Vec<Json> = spec
            .inline_policies
            .iter()
            .map(|policy| {
                json!({
                    "PolicyName": &policy.policy_name,
                    "PolicyDocument": {
                        "Version": "2012-10-17",
                        "Statement": policy.statements.iter().map(|statement| json!({
                            "Effect": render_effect(statement.effect),
                            "Action": &statement.actions,
                            "Resource": &statement.resources,
                        })).collect::<Vec<_>>(),
                    },
                })
            })
            .collect();
        properties.insert(String::from("Policies"), Json::Array(policies));
    }

    return json!({ "Type": "AWS::IAM::Role", "Properties": properties });
}

fn render_security_group(spec: &SecurityGroupSpec) -> Json {
    let ingress: Vec<Json> = spec
        .ingress
        .iter()
        .map(|rule| {
            json!({
                "CidrIp": &rule.cidr,
                "IpProtocol": &rule.protocol,
                "FromPort": rule.from_port,
                "ToPort": rule.to_port,
                "Description": &rule.description,
            })
        })
        .collect();

    let mut properties = Map::new();
    properties.insert(String::from("GroupName"), json!(&spec.group_name));
    properties.insert(String::from("GroupDescription"), json!(&spec.group_name));
    properties.insert(String::from("VpcLookup"), json!(&spec.vpc.vpc_name));
    properties.insert(String::from("SecurityGroupIngress"), Json::Array(ingress));
    if spec.allow_all_outbound {
        properties.insert(
            String::from("SecurityGroupEgress"),
            json!([{ "CidrIp": "0.0.0.0/0", "IpProtocol": "-1" }]),
        );
    }

    return json!({ "Type": "AWS::EC2::SecurityGroup", "Properties": properties });
}

fn render_layer(spec: &LayerSpec) -> Json {
    return json!({
        "Type": "AWS::Lambda::LayerVersion",
        "Properties": {
            "Content": { "Asset": &spec.asset_path },
            "CompatibleRuntimes": &spec.compatible_runtimes,
            "Description": &spec.description,
        },
    });
}

fn render_function(spec: &FunctionSpec) -> Json {
    let mut properties = Map::new();
    properties.insert(String::from("FunctionName"), json!(&spec.function_name));
    properties.insert(String::from("Runtime"), json!(&spec.runtime));
    properties.insert(
        String::from("Code"),
        match &spec.code {
            Code::Entry(entry) => json!({ "Entry": entry }),
            Code::Asset(asset_path) => json!({ "Asset": asset_path }),
        },
    );
    if let Some(handler) = &spec.handler {
        properties.insert(String::from("Handler"), json!(handler));
    }
    if let Some(memory_mb) = spec.memory_mb {
        properties.insert(String::from("MemorySize"), json!(memory_mb));
    }
    properties.insert(String::from("Timeout"), json!(spec.timeout_secs));
    if !spec.environment.is_empty() {
        properties.insert(
            String::from("Environment"),
            json!({ "Variables": &spec.environment }),
        );
    }
    properties.insert(
        String::from("Role"),
        render_value(&spec.role.arn()),
    );
    if !spec.layers.is_empty() {
        let layers: Vec<Json> = spec
            .layers
            .iter()
            .map(|layer| render_value(&layer.reference()))
            .collect();
        properties.insert(String::from("Layers"), Json::Array(layers));
    }
    if let Some(reserved) = spec.reserved_concurrent_executions {
        properties.insert(String::from("ReservedConcurrentExecutions"), json!(reserved));
    }
    if let Some(placement) = &spec.vpc_placement {
        let security_group_ids = Value::List(
            placement
                .security_groups
                .iter()
                .map(|group| group.reference())
                .collect(),
        );
        let subnet_ids = Value::List(
            placement
                .subnets
                .iter()
                .map(|subnet| Value::from(subnet.subnet_id.as_str()))
                .collect(),
        );
        properties.insert(
            String::from("VpcConfig"),
            json!({
                "VpcLookup": &placement.vpc.vpc_name,
                "SecurityGroupIds": render_value(&security_group_ids),
                "SubnetIds": render_value(&subnet_ids),
            }),
        );
    }

    return json!({ "Type": "AWS::Lambda::Function", "Properties": properties });
}

fn render_log_group(spec: &LogGroupSpec) -> Json {
    let mut properties = Map::new();
    if let Some(log_group_name) = &spec.log_group_name {
        properties.insert(String::from("LogGroupName"), json!(log_group_name));
    }
    if let Some(retention_days) = spec.retention_days {
        properties.insert(String::from("RetentionInDays"), json!(retention_days));
    }

    let deletion_policy = match spec.removal_policy {
        RemovalPolicy::Destroy => "Delete",
        RemovalPolicy::Retain => "Retain",
    };
    return json!({
        "Type": "AWS::Logs::LogGroup",
        "DeletionPolicy": deletion_policy,
        "Properties": properties,
    });
}

fn render_custom_resource(spec: &CustomResourceSpec) -> Json {
    let mut properties = Map::new();
    properties.insert(
        String::from("ServiceToken"),
        render_value(&spec.service_token),
    );
    for (key, value) in &spec.properties {
        properties.insert(key.clone(), render_value(value));
    }

    let mut resource = json!({
        "Type": "AWS::CloudFormation::CustomResource",
        "Properties": properties,
    });
    // The engine infers ordering from the token reference; the explicit
    // DependsOn also makes the provider edge visible in the template.
    if let Value::Ref(provider) | Value::GetAtt(provider, _) = &spec.service_token {
        resource["DependsOn"] = json!([&provider.logical_id]);
    }
    return resource;
}
