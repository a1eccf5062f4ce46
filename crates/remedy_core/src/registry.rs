use std::collections::BTreeMap;

/// Production policy table: external policy id to runbook id.
///
/// Policy ids are issued by the posture-management source and are opaque
/// here. Several policies intentionally share one runbook (variants of the
/// same finding class). The all-ones id is the end-to-end connectivity
/// probe.
const BUILTIN_POLICY_TABLE: &[(&str, &str)] = &[
    ("c2b84f89-7ec8-473e-a6af-404feeeb96c5", "AWS-CLT-002"),
    ("0d07ac51-fbfe-44fe-8edb-3314c9995ee0", "AWS-CLT-004"),
    ("962e0daa-3c2d-4d79-9a5f-e0bf8fd4bb3b", "AWS-CLT-004"),
    ("38e3d3cf-b694-46ec-8bd2-8f02194b5040", "AWS-CLT-005"),
    ("b76ad441-e715-4fd0-bbc3-cd3b2bee34bf", "AWS-CLT-006"),
    ("617b9138-584b-4e8e-ad15-7fbabafbed1a", "AWS-EC2-002"),
    ("519456f2-f9eb-407b-b32d-064f1ac7f0ca", "AWS-EC2-003"),
    ("b82f90ce-ed8b-4b49-970c-2268b0a6c2e5", "AWS-EC2-004"),
    ("65daa6a0-e040-434e-aca3-9d5765c96e7c", "AWS-EC2-010"),
    ("3b642d25-4534-487a-9399-c2622754ecb5", "AWS-EC2-010"),
    ("760f2823-997e-495f-a538-5fb073c0ee78", "AWS-EC2-010"),
    ("ab7f8eda-18ab-457c-b5d3-fd4f53c722bc", "AWS-EC2-010"),
    ("8dd9e369-0c09-4477-97a2-ff0d50507fe2", "AWS-EC2-010"),
    ("89cbc2f1-fcb0-48b9-be71-4cbe2d18a5f7", "AWS-EC2-010"),
    ("14d10ad2-51df-4b07-be69-e94951cc7067", "AWS-EC2-010"),
    ("cdcd663c-e9c9-4472-9779-e5f38751524a", "AWS-EC2-010"),
    ("c2074d5a-aa28-4dde-90c1-82f528cec55e", "AWS-EC2-010"),
    ("6eaf6455-1659-4c4b-bff5-c8c7b0fda201", "AWS-EC2-010"),
    ("81a2200a-c63e-4860-85a0-b54eaa581135", "AWS-EC2-036"),
    ("2378dbf4-b104-4bda-9b05-7417affbba3f", "AWS-EC2-038"),
    ("566686e8-0581-4df5-ae22-5a901ed37b58", "AWS-EC2-039"),
    ("7c714cb4-3d47-4c32-98d4-c13f92ce4ec5", "AWS-EC2-042"),
    ("7eb7f61e-df59-42d4-8236-7d012f278fa6", "AWS-ELB-009"),
    ("551ee7ba-edb6-468e-a018-8774da9b1e85", "AWS-ELB-012"),
    ("b675c604-e886-43aa-a60f-a9ad1f3742d3", "AWS-ELB-013"),
    ("f2a2bcf1-2966-4cb5-9230-bd39c9903a02", "AWS-ELB-015"),
    ("7ca5af2c-d18d-4004-9ad4-9c1fbfcab218", "AWS-IAM-015"),
    ("d9b86448-11a2-f9d4-74a5-f6fc590caeef", "AWS-IAM-016"),
    ("497f7e2c-b702-47c7-9a07-f0f6404ac896", "AWS-KMS-001"),
    ("1bb6005a-dca6-40e2-b0a6-24da968c0808", "AWS-RDS-005"),
    ("a707de6a-11b7-478a-b636-5e21ee1f6162", "AWS-RDS-007"),
    ("c5305272-a732-4e8e-8427-6a9701cd2a6f", "AWS-RDS-010"),
    ("9dd6cc35-1855-48c8-86ba-0e1818ce11e2", "AWS-RDS-011"),
    ("d65fd313-1c5c-42a1-98b2-a73bdeda19a6", "AWS-REDSHIFT-001"),
    ("89ea62c1-3845-4134-b337-cc82203b8ff9", "AWS-SSS-001"),
    ("43c42760-5283-4bc4-ac43-a80e58c4139f", "AWS-SSS-008"),
    ("4daa435b-fa46-457a-9359-6a4b4a43a442", "AWS-SSS-009"),
    ("7913fcbf-b679-5aac-d979-1b6817becb22", "AWS-SSS-014"),
    ("630d3779-d932-4fbf-9cce-6e8d793c6916", "PC-AWS-S3-29"),
    ("49f4760d-c951-40e4-bfe1-08acaa17672a", "AWS-VPC-020"),
    ("11111111-1111-1111-1111-111111111111", "AWS-TEST-001"),
];

/// Immutable mapping from external policy id to runbook id. Built once at
/// process start and only ever read afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRegistry {
    entries: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryError {
    message: String,
}

impl RegistryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RegistryError {}

impl PolicyRegistry {
    /// Builds the production table. The table is validated by
    /// [`PolicyRegistry::from_entries`]; a duplicate entry is a programming
    /// error caught by the registry unit tests.
    pub fn builtin() -> Self {
        Self::from_entries(
            BUILTIN_POLICY_TABLE
                .iter()
                .map(|(policy_id, runbook_id)| (policy_id.to_string(), runbook_id.to_string())),
        )
        .expect("builtin policy table should not contain duplicate policy ids")
    }

    /// Builds a registry from arbitrary entries. A duplicate policy id is a
    /// load-time validation error rather than a silent overwrite.
    pub fn from_entries(
        entries: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, RegistryError> {
        let mut map = BTreeMap::new();
        for (policy_id, runbook_id) in entries {
            let policy_id = policy_id.trim().to_string();
            if policy_id.is_empty() {
                return Err(RegistryError::new("policy id cannot be empty"));
            }
            if runbook_id.trim().is_empty() {
                return Err(RegistryError::new(format!(
                    "runbook id for policy {policy_id} cannot be empty"
                )));
            }
            if map.insert(policy_id.clone(), runbook_id).is_some() {
                return Err(RegistryError::new(format!(
                    "duplicate policy id in registry: {policy_id}"
                )));
            }
        }
        Ok(Self { entries: map })
    }

    /// Exact-match lookup. Absence of a mapping is a normal outcome, not an
    /// error.
    pub fn resolve(&self, policy_id: &str) -> Option<&str> {
        self.entries.get(policy_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
