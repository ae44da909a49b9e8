use std::collections::BTreeMap;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Duplicate logical id `{0}` in stack")]
    DuplicateLogicalId(String),
}

/// Reference to a resource declared earlier in the same stack. Property values
/// built from a `ResourceRef` stay symbolic until the emitter renders them, so
/// the deployment engine sees the dependency graph between declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub logical_id: String,
}

impl ResourceRef {
    pub fn reference(&self) -> Value {
        return Value::Ref(self.clone());
    }

    pub fn arn(&self) -> Value {
        return Value::GetAtt(self.clone(), "Arn");
    }
}

/// A single property value inside a resource declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Literal(String),
    Ref(ResourceRef),
    GetAtt(ResourceRef, &'static str),
    List(Vec<Value>),
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        return Value::Literal(value);
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        return Value::Literal(value.to_string());
    }
}

/// A VPC imported by name. The lookup is deferred: synthesis records the name
/// and the deployment engine verifies the network exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpcRef {
    pub vpc_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetRef {
    pub subnet_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketRef {
    pub bucket_name: String,
}

impl BucketRef {
    pub fn arn(&self) -> String {
        return format!("arn:aws:s3:::{}", self.bucket_name);
    }
}

/// External resources this stack expects to already exist.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Vpc { vpc_name: String },
    Subnet { subnet_id: String },
    Bucket { bucket_name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolicyStatement {
    pub effect: Effect,
    pub actions: Vec<String>,
    pub resources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolicySpec {
    pub policy_name: String,
    pub statements: Vec<PolicyStatement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Principal {
    Service(String),
    Account(String),
    Composite(Vec<Principal>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoleSpec {
    pub role_name: Option<String>,
    pub assumed_by: Principal,
    pub description: Option<String>,
    pub managed_policy_arns: Vec<String>,
    pub inline_policies: Vec<PolicySpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngressRule {
    pub cidr: String,
    pub protocol: String,
    pub from_port: u16,
    pub to_port: u16,
    pub description: String,
}

impl IngressRule {
    /// Ingress over every TCP port from the given CIDR block.
    pub fn all_tcp(cidr: &str, description: &str) -> Self {
        return Self {
            cidr: cidr.to_string(),
            protocol: String::from("tcp"),
            from_port: 0,
            to_port: 65535,
            description: description.to_string(),
        };
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SecurityGroupSpec {
    pub group_name: String,
    pub vpc: VpcRef,
    pub allow_all_outbound: bool,
    pub ingress: Vec<IngressRule>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayerSpec {
    pub asset_path: String,
    pub compatible_runtimes: Vec<String>,
    pub description: String,
}

/// Where a function's code comes from: an in-repo source entry compiled at
/// packaging time, or a pre-built asset directory shipped as-is.
#[derive(Debug, Clone, PartialEq)]
pub enum Code {
    Entry(String),
    Asset(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VpcPlacement {
    pub vpc: VpcRef,
    pub security_groups: Vec<ResourceRef>,
    pub subnets: Vec<SubnetRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSpec {
    pub function_name: String,
    pub code: Code,
    pub handler: Option<String>,
    pub runtime: String,
    pub memory_mb: Option<u32>,
    pub timeout_secs: u32,
    pub environment: BTreeMap<String, String>,
    pub role: ResourceRef,
    pub layers: Vec<ResourceRef>,
    pub reserved_concurrent_executions: Option<u32>,
    pub vpc_placement: Option<VpcPlacement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalPolicy {
    Destroy,
    Retain,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogGroupSpec {
    pub log_group_name: Option<String>,
    pub retention_days: Option<u32>,
    pub removal_policy: RemovalPolicy,
}

/// A declaration whose provisioning is delegated to the handler function
/// behind `service_token` rather than a built-in resource type.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomResourceSpec {
    pub service_token: Value,
    pub properties: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResourceKind {
    Role(RoleSpec),
    SecurityGroup(SecurityGroupSpec),
    LayerVersion(LayerSpec),
    Function(FunctionSpec),
    LogGroup(LogGroupSpec),
    CustomResource(CustomResourceSpec),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub logical_id: String,
    pub kind: ResourceKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StackEnv {
    pub region: String,
    pub account: String,
}

/// One stack's worth of declarations, owned exclusively by the assembler that
/// built it. Resources keep declaration order; the emitter translates the
/// whole descriptor into the deployment engine's format in one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct StackDescriptor {
    /// Names the synthesis artifact; both assemblers share the stack naming
    /// convention, so the artifact id keeps their outputs apart.
    pub artifact_id: String,
    pub stack_name: String,
    pub description: String,
    pub env: StackEnv,
    pub tags: BTreeMap<String, String>,
    pub lookups: Vec<Lookup>,
    pub resources: Vec<Resource>,
}

impl StackDescriptor {
    pub fn new(artifact_id: String, stack_name: String, description: String, env: StackEnv) -> Self {
        return Self {
            artifact_id,
            stack_name,
            description,
            env,
            tags: BTreeMap::new(),
            lookups: Vec::new(),
            resources: Vec::new(),
        };
    }

    pub fn add_tag(&mut self, key: &str, value: &str) {
        self.tags.insert(key.to_string(), value.to_string());
    }

    pub fn lookup_vpc(&mut self, vpc_name: &str) -> VpcRef {
        self.lookups.push(Lookup::Vpc {
            vpc_name: vpc_name.to_string(),
        });
        return VpcRef {
            vpc_name: vpc_name.to_string(),
        };
    }

    pub fn import_subnet(&mut self, subnet_id: &str) -> SubnetRef {
        self.lookups.push(Lookup::Subnet {
            subnet_id: subnet_id.to_string(),
        });
        return SubnetRef {
            subnet_id: subnet_id.to_string(),
        };
    }

    pub fn import_bucket(&mut self, bucket_name: &str) -> BucketRef {
        self.lookups.push(Lookup::Bucket {
            bucket_name: bucket_name.to_string(),
        });
        return BucketRef {
            bucket_name: bucket_name.to_string(),
        };
    }

    /// Declare a resource and hand back the reference later declarations use
    /// to point at it. Logical ids must be unique within the stack.
    pub fn declare(&mut self, id_hint: &str, kind: ResourceKind) -> Result<ResourceRef, Error> {
        let logical_id = logical_id(id_hint);
        if self
            .resources
            .iter()
            .any(|resource| resource.logical_id == logical_id)
        {
            return Err(Error::DuplicateLogicalId(logical_id));
        }

        self.resources.push(Resource {
            logical_id: logical_id.clone(),
            kind,
        });
        return Ok(ResourceRef { logical_id });
    }

    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        return self
            .resources
            .iter()
            .find(|resource| resource.logical_id == logical_id);
    }
}

// Logical ids are alphanumeric: each `-`/`_`/`/` separated segment is
// capitalized and the separators are dropped.
fn logical_id(id_hint: &str) -> String {
    let mut id = String::new();
    for segment in id_hint.split(|c: char| !c.is_ascii_alphanumeric()) {
        let mut chars = segment.chars();
        if let Some(first) = chars.next() {
            id.push(first.to_ascii_uppercase());
            id.extend(chars);
        }
    }
    return id;
}
