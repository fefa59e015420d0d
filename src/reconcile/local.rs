//! Local rendering sink.
//!
//! Writes resolved variables to two dotfiles in the target directory:
//! environment variables as `export` lines and terraform variables as
//! assignments. Both files are truncated at the start of each pass; a single
//! writer consumes the resolution channel, so no file locking is needed.

use crate::config::{ManagedVariable, VariableDefaults};
use crate::errors::{DriftsyncError, Result};
use crate::model::VariableKind;
use crate::resolver::Resolver;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub const ENV_FILE: &str = "driftsync.env";
pub const TFVARS_FILE: &str = "driftsync.auth.tfvars";

/// Resolve all variables and render them into the two local files.
pub async fn render_local(
    resolver: Arc<Resolver>,
    variables: Vec<ManagedVariable>,
    defaults: &VariableDefaults,
    directory: &Path,
) -> Result<()> {
    let env_path = directory.join(ENV_FILE);
    let tfvars_path = directory.join(TFVARS_FILE);

    let mut env_file = std::fs::File::create(&env_path)
        .map_err(|e| DriftsyncError::io(e, format!("creating {}", env_path.display())))?;
    let mut tfvars_file = std::fs::File::create(&tfvars_path)
        .map_err(|e| DriftsyncError::io(e, format!("creating {}", tfvars_path.display())))?;

    let mut count = 0usize;
    let mut rx = resolver.stream(variables);
    while let Some(item) = rx.recv().await {
        let variable = item?;
        match variable.kind {
            VariableKind::Environment => {
                writeln!(env_file, "export {}={}", variable.name, variable.value.expose())
                    .map_err(|e| DriftsyncError::io(e, format!("writing {}", ENV_FILE)))?;
            }
            VariableKind::Terraform => {
                let hcl = variable.hcl.or(defaults.hcl).unwrap_or(false);
                if hcl {
                    writeln!(tfvars_file, "{} = {}", variable.name, variable.value.expose())
                        .map_err(|e| DriftsyncError::io(e, format!("writing {}", TFVARS_FILE)))?;
                } else {
                    writeln!(
                        tfvars_file,
                        "{} = \"{}\"",
                        variable.name,
                        variable.value.expose()
                    )
                    .map_err(|e| DriftsyncError::io(e, format!("writing {}", TFVARS_FILE)))?;
                }
            }
        }
        count += 1;
    }

    info!(count, directory = %directory.display(), "rendered variables locally");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EnvSource, VariableSpec};
    use crate::providers::CipherResolver;

    fn variable(kind: VariableKind, name: &str, env: &str, hcl: Option<bool>) -> ManagedVariable {
        ManagedVariable {
            kind,
            spec: VariableSpec {
                name: name.to_string(),
                env: Some(EnvSource { variable: env.to_string() }),
                cipher: None,
                store: None,
                sensitive: None,
                hcl,
                ttl_seconds: None,
            },
        }
    }

    #[tokio::test]
    async fn test_render_local_splits_kinds() {
        std::env::set_var("DRIFTSYNC_LOCAL_TEST_A", "env-value");
        std::env::set_var("DRIFTSYNC_LOCAL_TEST_B", "tf-value");
        std::env::set_var("DRIFTSYNC_LOCAL_TEST_C", "[\"a\", \"b\"]");

        let dir = tempfile::tempdir().unwrap();
        let resolver = Arc::new(Resolver::new(CipherResolver::new(None, None), None));
        let variables = vec![
            variable(VariableKind::Environment, "APP_TOKEN", "DRIFTSYNC_LOCAL_TEST_A", None),
            variable(VariableKind::Terraform, "db_password", "DRIFTSYNC_LOCAL_TEST_B", None),
            variable(VariableKind::Terraform, "subnets", "DRIFTSYNC_LOCAL_TEST_C", Some(true)),
        ];

        render_local(resolver, variables, &VariableDefaults::default(), dir.path())
            .await
            .unwrap();

        let env = std::fs::read_to_string(dir.path().join(ENV_FILE)).unwrap();
        assert_eq!(env, "export APP_TOKEN=env-value\n");

        let tfvars = std::fs::read_to_string(dir.path().join(TFVARS_FILE)).unwrap();
        assert!(tfvars.contains("db_password = \"tf-value\"\n"));
        assert!(tfvars.contains("subnets = [\"a\", \"b\"]\n"));

        std::env::remove_var("DRIFTSYNC_LOCAL_TEST_A");
        std::env::remove_var("DRIFTSYNC_LOCAL_TEST_B");
        std::env::remove_var("DRIFTSYNC_LOCAL_TEST_C");
    }

    #[tokio::test]
    async fn test_render_local_truncates_previous_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(ENV_FILE), "export STALE=1\n").unwrap();

        let resolver = Arc::new(Resolver::new(CipherResolver::new(None, None), None));
        render_local(resolver, Vec::new(), &VariableDefaults::default(), dir.path())
            .await
            .unwrap();

        let env = std::fs::read_to_string(dir.path().join(ENV_FILE)).unwrap();
        assert!(env.is_empty());
    }
}
