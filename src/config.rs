//! Configuração do NEXUS carregada a partir de `nexus.toml`.
//!
//! A struct [`NexusConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `NEXUS_DATA_FILE` tem precedência sobre o arquivo.

use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Configuração de nível superior carregada de `nexus.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct NexusConfig {
    /// Arquivo JSON onde a CLI persiste pendências e roteiros.
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,

    /// Situação atribuída a pendências criadas sem uma.
    #[serde(default = "default_situation")]
    pub default_situation: String,

    /// Níveis mínimos de privilégio por capacidade.
    #[serde(default)]
    pub privileges: PrivilegeThresholds,
}

/// Nível mínimo exigido para cada capacidade privilegiada.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PrivilegeThresholds {
    #[serde(default = "default_delete_ticket")]
    pub delete_ticket: u8,
    #[serde(default = "default_override_visibility")]
    pub override_visibility: u8,
    #[serde(default = "default_edit_any_ticket")]
    pub edit_any_ticket: u8,
    #[serde(default = "default_manage_routes")]
    pub manage_routes: u8,
}

// Valor padrão para o arquivo de dados: "nexus-data.json".
fn default_data_file() -> PathBuf {
    PathBuf::from("nexus-data.json")
}

// Valor padrão para a situação inicial: "Open".
fn default_situation() -> String {
    "Open".to_string()
}

fn default_delete_ticket() -> u8 {
    3
}

fn default_override_visibility() -> u8 {
    2
}

fn default_edit_any_ticket() -> u8 {
    3
}

// Só administradores mantêm roteiros.
fn default_manage_routes() -> u8 {
    4
}

impl Default for PrivilegeThresholds {
    fn default() -> Self {
        Self {
            delete_ticket: default_delete_ticket(),
            override_visibility: default_override_visibility(),
            edit_any_ticket: default_edit_any_ticket(),
            manage_routes: default_manage_routes(),
        }
    }
}

impl Default for NexusConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            default_situation: default_situation(),
            privileges: PrivilegeThresholds::default(),
        }
    }
}

impl NexusConfig {
    /// Carrega a configuração de `nexus.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("nexus.toml"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<NexusConfig>(&contents)?
        } else {
            Self::default()
        };

        // Variável de ambiente tem precedência sobre o arquivo de configuração.
        if let Ok(file) = std::env::var("NEXUS_DATA_FILE")
            && !file.is_empty()
        {
            config.data_file = PathBuf::from(file);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = NexusConfig::default();
        assert_eq!(config.data_file, PathBuf::from("nexus-data.json"));
        assert_eq!(config.default_situation, "Open");
        assert_eq!(config.privileges.delete_ticket, 3);
        assert_eq!(config.privileges.override_visibility, 2);
        assert_eq!(config.privileges.edit_any_ticket, 3);
        assert_eq!(config.privileges.manage_routes, 4);
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            default_situation = "Aberta"

            [privileges]
            manage_routes = 5
        "#;
        let config: NexusConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.default_situation, "Aberta");
        assert_eq!(config.privileges.manage_routes, 5);
        assert_eq!(config.privileges.delete_ticket, 3);
        assert_eq!(config.data_file, PathBuf::from("nexus-data.json"));
    }

    #[test]
    fn load_reads_file_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nexus.toml");
        std::fs::write(&path, "[privileges]\ndelete_ticket = 1\n").unwrap();

        let config = NexusConfig::load_from(&path).unwrap();
        assert_eq!(config.privileges.delete_ticket, 1);
        assert_eq!(config.default_situation, "Open");
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let config = NexusConfig::load_from(Path::new("/definitely/not/here/nexus.toml")).unwrap();
        assert_eq!(config.default_situation, "Open");
    }
}
