//! Command-line interface configuration
//!
//! Settings are read from `foenixmgr.toml`. The first file found wins, searched
//! in this order:
//!
//! 1. the current directory
//! 2. the directory named by the `FOENIXMGR` environment variable
//! 3. the platform configuration directory
//!
//! Without any file every setting takes its default value.

use std::{
    env,
    fs::read_to_string,
    path::{Path, PathBuf},
    time::Duration,
};

use directories::ProjectDirs;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    connection::transport::{PortSettings, DEFAULT_DATA_RATE, DEFAULT_TIMEOUT_SECS},
    error::Error,
    target::{Cpu, Machine, TargetConfig, DEFAULT_CHUNK_SIZE, DEFAULT_FLASH_SIZE},
};

/// Name of the configuration file
pub const CONFIG_FILE_NAME: &str = "foenixmgr.toml";
/// Environment variable naming an extra configuration directory
pub const CONFIG_DIR_VAR: &str = "FOENIXMGR";

const DEFAULT_ADDRESS: u32 = 0x38_0000;

fn deserialize_hex_to_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let hex = String::deserialize(deserializer)?.to_lowercase();

    parse_hex_u32(&hex).map_err(serde::de::Error::custom)
}

fn serialize_u32_to_hex<S>(value: &u32, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&format!("{value:06x}"))
}

/// Parse a hexadecimal number, with or without a `0x` or `$` prefix
pub fn parse_hex_u32(input: &str) -> Result<u32, std::num::ParseIntError> {
    let hex = input.trim();
    let hex = hex
        .strip_prefix("0x")
        .or_else(|| hex.strip_prefix("0X"))
        .or_else(|| hex.strip_prefix('$'))
        .unwrap_or(hex);

    u32::from_str_radix(hex, 16)
}

/// Tool configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Serial device, or `host:port` of a TCP relay
    pub port: Option<String>,
    /// Serial data rate
    pub data_rate: u32,
    /// Read timeout, in seconds
    pub timeout: u64,
    /// CPU of the connected machine
    pub cpu: Cpu,
    /// Largest block sent in one write
    pub chunk_size: usize,
    /// Size of a full flash image, in bytes
    pub flash_size: usize,
    /// Default address for commands which take one
    #[serde(
        serialize_with = "serialize_u32_to_hex",
        deserialize_with = "deserialize_hex_to_u32"
    )]
    pub address: u32,
    /// Connected machine
    pub target: Option<Machine>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: None,
            data_rate: DEFAULT_DATA_RATE,
            timeout: DEFAULT_TIMEOUT_SECS,
            cpu: Cpu::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            flash_size: DEFAULT_FLASH_SIZE,
            address: DEFAULT_ADDRESS,
            target: None,
        }
    }
}

impl Config {
    /// Load the first configuration file found, or the defaults
    pub fn load() -> Result<Self, Error> {
        let cwd = env::current_dir().map_err(|e| Error::FileOpenError(".".into(), e))?;
        let env_dir = env::var_os(CONFIG_DIR_VAR).map(PathBuf::from);
        let global_dir = ProjectDirs::from("", "", "foenixmgr")
            .map(|dirs| dirs.config_dir().to_path_buf());

        match config_candidates(&cwd, env_dir, global_dir)
            .into_iter()
            .find(|path| path.is_file())
        {
            Some(path) => Self::load_from(&path),
            None => {
                debug!("No {CONFIG_FILE_NAME} found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self, Error> {
        let raw = read_to_string(path)
            .map_err(|e| Error::FileOpenError(path.display().to_string(), e))?;
        let config: Config = toml::from_str(&raw)
            .map_err(|e| Error::InvalidConfig(path.display().to_string(), Box::new(e)))?;

        debug!("Config loaded from {}: {config:#?}", path.display());
        Ok(config)
    }

    /// Resolve the target description, with `target` overriding the file
    pub fn target_config(&self, target: Option<Machine>) -> TargetConfig {
        TargetConfig::new(self.cpu)
            .with_machine(target.or(self.target))
            .with_chunk_size(self.chunk_size)
            .with_flash_size(self.flash_size)
    }

    pub fn port_settings(&self) -> PortSettings {
        PortSettings {
            data_rate: self.data_rate,
            timeout: Duration::from_secs(self.timeout),
        }
    }
}

/// Configuration file locations, in search order
fn config_candidates(
    cwd: &Path,
    env_dir: Option<PathBuf>,
    global_dir: Option<PathBuf>,
) -> Vec<PathBuf> {
    std::iter::once(cwd.to_path_buf())
        .chain(env_dir)
        .chain(global_dir)
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::target::FlashGeometry;

    #[derive(Debug, Deserialize, Serialize)]
    struct TestData {
        #[serde(
            serialize_with = "serialize_u32_to_hex",
            deserialize_with = "deserialize_hex_to_u32"
        )]
        value: u32,
    }

    #[test]
    fn test_deserialize_hex_to_u32() {
        let result: Result<TestData, _> = toml::from_str(r#"value = "380000""#);
        assert_eq!(result.unwrap().value, 0x38_0000);

        let result: Result<TestData, _> = toml::from_str(r#"value = "0x1000""#);
        assert_eq!(result.unwrap().value, 0x1000);

        let result: Result<TestData, _> = toml::from_str(r#"value = "$FFFC""#);
        assert_eq!(result.unwrap().value, 0xFFFC);

        let result: Result<TestData, _> = toml::from_str(r#"value = "ABCD""#);
        assert_eq!(result.unwrap().value, 0xABCD);

        let result: Result<TestData, _> = toml::from_str(r#"value = "xyz""#);
        assert!(result.is_err());
    }

    #[test]
    fn test_serialize_u32_to_hex() {
        let text = toml::to_string(&TestData { value: 0x1000 }).unwrap();
        assert_eq!(text.trim(), r#"value = "001000""#);
    }

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.data_rate, 6_000_000);
        assert_eq!(config.timeout, 60);
        assert_eq!(config.cpu, Cpu::W65c02);
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.flash_size, 524_288);
        assert_eq!(config.address, 0x38_0000);
    }

    #[test]
    fn test_full_file() {
        let config: Config = toml::from_str(
            r#"
            port = "/dev/ttyUSB0"
            data_rate = 115200
            timeout = 5
            cpu = "68040"
            chunk_size = 1024
            flash_size = 1048576
            address = "0x20000"
            target = "A2560"
            "#,
        )
        .unwrap();

        assert_eq!(config.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.cpu, Cpu::M68040);
        assert_eq!(config.address, 0x2_0000);
        assert_eq!(config.target, Some(Machine::A2560));
        assert_eq!(
            config.port_settings(),
            PortSettings {
                data_rate: 115_200,
                timeout: Duration::from_secs(5),
            }
        );
    }

    #[test]
    fn test_invalid_values() {
        assert!(toml::from_str::<Config>(r#"cpu = "z80""#).is_err());
        assert!(toml::from_str::<Config>(r#"target = "c64""#).is_err());
        assert!(toml::from_str::<Config>(r#"labels = "basic8""#).is_err());
    }

    #[test]
    fn test_target_override() {
        let config = Config {
            target: Some(Machine::A2560),
            chunk_size: 512,
            ..Config::default()
        };

        assert_eq!(config.target_config(None).geometry, None);
        assert_eq!(config.target_config(None).chunk_size(), 512);
        assert_eq!(
            config.target_config(Some(Machine::F256k)).geometry,
            Some(FlashGeometry::new(8, 8, 8).unwrap())
        );
    }

    #[test]
    fn test_search_order() {
        let candidates = config_candidates(
            Path::new("/work"),
            Some(PathBuf::from("/env")),
            Some(PathBuf::from("/home/user/.config/foenixmgr")),
        );

        assert_eq!(
            candidates,
            vec![
                PathBuf::from("/work/foenixmgr.toml"),
                PathBuf::from("/env/foenixmgr.toml"),
                PathBuf::from("/home/user/.config/foenixmgr/foenixmgr.toml"),
            ]
        );
        assert_eq!(config_candidates(Path::new("/work"), None, None).len(), 1);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        fs::write(&path, "cpu = \"65816\"\n").unwrap();
        assert_eq!(Config::load_from(&path).unwrap().cpu, Cpu::W65816);

        fs::write(&path, "cpu = [\n").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(Error::InvalidConfig(..))
        ));
    }
}
