use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use strata_error::{DbError, Result};

use crate::arrays::scalar::ScalarValue;

pub const DEFAULT_MERGE_BATCH_ROWS: usize = 1 << 16;

/// What to do when the session reference counts don't match the tracked
/// frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefCountVerification {
    /// Fail the call with an invariant error.
    Strict,
    /// Log the mismatch and continue.
    Log,
    /// Don't check.
    Off,
}

impl RefCountVerification {
    pub fn from_name(name: &str) -> Result<Self> {
        Ok(match name {
            "strict" => Self::Strict,
            "log" => Self::Log,
            "off" => Self::Off,
            other => {
                return Err(DbError::validation("Unknown refcount verification mode")
                    .with_field("mode", other)
                    .with_field("expected", "strict, log, off"));
            }
        })
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Log => "log",
            Self::Off => "off",
        }
    }
}

impl Default for RefCountVerification {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Strict
        } else {
            Self::Log
        }
    }
}

impl fmt::Display for RefCountVerification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration for an in-process cluster.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ClusterConfig {
    pub num_nodes: usize,
    pub num_threads: usize,
    pub merge_batch_rows: usize,
    pub verify_refcounts: RefCountVerification,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            num_nodes: 1,
            num_threads: num_cpus::get(),
            merge_batch_rows: DEFAULT_MERGE_BATCH_ROWS,
            verify_refcounts: RefCountVerification::default(),
        }
    }
}

impl ClusterConfig {
    pub fn set_from_scalar(&mut self, name: &str, value: ScalarValue) -> Result<()> {
        let func = lookup_setting(name)?;
        (func.set)(value, self)
    }

    /// Set a value from its textual form, e.g. from a command line flag.
    pub fn set_from_str(&mut self, name: &str, value: &str) -> Result<()> {
        let scalar = match value.parse::<i64>() {
            Ok(v) => ScalarValue::Int64(v),
            Err(_) => ScalarValue::Utf8(value.to_string()),
        };
        self.set_from_scalar(name, scalar)
    }

    pub fn get_as_scalar(&self, name: &str) -> Result<ScalarValue> {
        let func = lookup_setting(name)?;
        Ok((func.get)(self))
    }

    pub fn reset(&mut self, name: &str) -> Result<()> {
        let def_conf = Self::default();
        let func = lookup_setting(name)?;
        let scalar = (func.get)(&def_conf);
        (func.set)(scalar, self)
    }

    /// Names and descriptions of all settings.
    pub fn settings() -> impl Iterator<Item = (&'static str, &'static str)> {
        let mut settings: Vec<_> = GET_SET_FUNCTIONS
            .iter()
            .map(|(name, funcs)| (*name, funcs.description))
            .collect();
        settings.sort_unstable();
        settings.into_iter()
    }
}

fn lookup_setting(name: &str) -> Result<&'static SettingFunctions> {
    GET_SET_FUNCTIONS.get(name).ok_or_else(|| {
        DbError::validation(format!("Missing setting for '{name}'"))
            .with_field("available", GET_SET_FUNCTIONS.len())
    })
}

struct SettingFunctions {
    description: &'static str,
    set: fn(scalar: ScalarValue, conf: &mut ClusterConfig) -> Result<()>,
    get: fn(conf: &ClusterConfig) -> ScalarValue,
}

impl SettingFunctions {
    const fn new<S: ClusterSetting>() -> Self {
        SettingFunctions {
            description: S::DESCRIPTION,
            set: S::set_from_scalar as _,
            get: S::get_as_scalar as _,
        }
    }
}

fn insert_setting<S: ClusterSetting>(map: &mut HashMap<&'static str, SettingFunctions>) {
    if map.insert(S::NAME, SettingFunctions::new::<S>()).is_some() {
        panic!("Duplicate settings names: {}", S::NAME);
    }
}

static GET_SET_FUNCTIONS: LazyLock<HashMap<&'static str, SettingFunctions>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    insert_setting::<NumNodes>(&mut map);
    insert_setting::<NumThreads>(&mut map);
    insert_setting::<MergeBatchRows>(&mut map);
    insert_setting::<VerifyRefCounts>(&mut map);

    map
});

pub trait ClusterSetting: Sync + Send + 'static {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    fn set_from_scalar(scalar: ScalarValue, conf: &mut ClusterConfig) -> Result<()>;
    fn get_as_scalar(conf: &ClusterConfig) -> ScalarValue;
}

fn positive_usize(scalar: &ScalarValue, setting: &'static str) -> Result<usize> {
    let val = scalar.try_as_i64()?;
    if val < 1 {
        return Err(DbError::validation("Setting must be a positive integer")
            .with_field("setting", setting)
            .with_field("value", val));
    }
    Ok(val as usize)
}

pub struct NumNodes;

impl ClusterSetting for NumNodes {
    const NAME: &'static str = "num_nodes";
    const DESCRIPTION: &'static str = "Number of simulated nodes in the cluster";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut ClusterConfig) -> Result<()> {
        conf.num_nodes = positive_usize(&scalar, Self::NAME)?;
        Ok(())
    }

    fn get_as_scalar(conf: &ClusterConfig) -> ScalarValue {
        ScalarValue::Int64(conf.num_nodes as i64)
    }
}

pub struct NumThreads;

impl ClusterSetting for NumThreads {
    const NAME: &'static str = "num_threads";
    const DESCRIPTION: &'static str = "Worker threads used for chunk tasks and remote tasks";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut ClusterConfig) -> Result<()> {
        conf.num_threads = positive_usize(&scalar, Self::NAME)?;
        Ok(())
    }

    fn get_as_scalar(conf: &ClusterConfig) -> ScalarValue {
        ScalarValue::Int64(conf.num_threads as i64)
    }
}

pub struct MergeBatchRows;

impl ClusterSetting for MergeBatchRows {
    const NAME: &'static str = "merge_batch_rows";
    const DESCRIPTION: &'static str = "Maximum rows in a single output chunk produced by a join";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut ClusterConfig) -> Result<()> {
        conf.merge_batch_rows = positive_usize(&scalar, Self::NAME)?;
        Ok(())
    }

    fn get_as_scalar(conf: &ClusterConfig) -> ScalarValue {
        ScalarValue::Int64(conf.merge_batch_rows as i64)
    }
}

pub struct VerifyRefCounts;

impl ClusterSetting for VerifyRefCounts {
    const NAME: &'static str = "verify_refcounts";
    const DESCRIPTION: &'static str =
        "Session reference count checking between expressions (strict, log, off)";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut ClusterConfig) -> Result<()> {
        let val = scalar.try_into_string()?;
        conf.verify_refcounts = RefCountVerification::from_name(&val)?;
        Ok(())
    }

    fn get_as_scalar(conf: &ClusterConfig) -> ScalarValue {
        ScalarValue::Utf8(conf.verify_refcounts.as_str().to_string())
    }
}
