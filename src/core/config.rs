//! # Configuration Module / 配置模块
//!
//! The suite file (`TestSuite.toml`) lists the cases to run. Each case names a
//! built-in `kind` and carries its parameters, either inline in a `with` table or
//! in an Avocado-style YAML parameter file, or both (inline values win). A
//! parameter file with `!mux` nodes expands into one case per variant.
//!
//! 套件文件（`TestSuite.toml`）列出要运行的用例。每个用例指定一个内置的 `kind`
//! 并携带参数：可以写在内联的 `with` 表中，也可以写在 Avocado 风格的 YAML
//! 参数文件中，或两者兼有（内联值优先）。带有 `!mux` 节点的参数文件会按变体展开为多个用例。

use anyhow::{Context, Result, bail};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// A single parameter value as it appears in YAML or TOML.
/// 出现在 YAML 或 TOML 中的单个参数值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ParamValue>),
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

/// The raw parameters of one test case.
///
/// Parameters are read once, before setup, and never change while the case runs.
/// Case kinds never look keys up by name at runtime: they decode the whole map into
/// their own typed options struct with [`Params::decode`].
///
/// 单个测试用例的原始参数。
///
/// 参数在 setup 之前读取一次，用例运行期间不会改变。
/// 各用例类型不会在运行时按名称查找键，而是通过 [`Params::decode`]
/// 将整个映射解码为自己的强类型选项结构体。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params {
    values: BTreeMap<String, ParamValue>,
    /// Keys that came from a parameter file. A kind that does not declare one
    /// of them ignores it instead of rejecting the case.
    #[serde(skip)]
    loose: BTreeSet<String>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks every current key as coming from a parameter file.
    pub fn mark_from_file(mut self) -> Self {
        self.loose = self.values.keys().cloned().collect();
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        let key = key.into();
        self.loose.remove(&key);
        self.values.insert(key, value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.values.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    /// Overlays `other` on top of `self`; keys present in both take `other`'s value.
    pub fn merge(&mut self, other: &Params) {
        for (key, value) in &other.values {
            if other.loose.contains(key) {
                self.loose.insert(key.clone());
            } else {
                self.loose.remove(key);
            }
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Decodes the parameters into a typed options struct.
    ///
    /// Unknown keys and ill-typed values are rejected here, before any case runs.
    /// Keys that only came from a parameter file are dropped when the kind does
    /// not declare them.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let mut values = self.values.clone();
        loop {
            let value = serde_json::to_value(&values).context("Failed to encode parameters")?;
            match serde_json::from_value(value) {
                Ok(decoded) => return Ok(decoded),
                Err(e) => {
                    let message = e.to_string();
                    match unknown_field(&message) {
                        Some(field) if self.loose.contains(field) => {
                            values.remove(field);
                        }
                        _ => bail!("invalid parameters: {}", message),
                    }
                }
            }
        }
    }
}

fn unknown_field(message: &str) -> Option<&str> {
    let (_, rest) = message.split_once("unknown field `")?;
    rest.split_once('`').map(|(field, _)| field)
}

/// One combination of an Avocado variant tree.
/// Avocado 变体树中的一种组合。
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    /// The names of the chosen `!mux` children, outermost first.
    pub path: Vec<String>,
    pub params: Params,
}

impl Variant {
    /// The path as used in case names, e.g. `lsslot/lsslot_pci`.
    pub fn id(&self) -> String {
        self.path.join("/")
    }
}

/// Parses an Avocado-style YAML parameter document into its variants.
///
/// Leaf keys of a mapping are parameters of that node, and deeper nodes override
/// the keys of their parents. The children of a plain mapping are all combined,
/// while the children of a `!mux` node are alternatives. A document without any
/// `!mux` yields exactly one variant with an empty path.
///
/// 将 Avocado 风格的 YAML 参数文档解析为变体列表。
/// 普通映射的子节点全部组合，`!mux` 节点的子节点互为备选。
pub fn variants_from_yaml_str(content: &str) -> Result<Vec<Variant>> {
    let document: serde_yaml::Value =
        serde_yaml::from_str(content).context("Failed to parse YAML parameters")?;
    let root = match &document {
        serde_yaml::Value::Null => {
            return Ok(vec![Variant {
                path: vec![],
                params: Params::new(),
            }]);
        }
        serde_yaml::Value::Mapping(mapping) => mapping,
        other => bail!("parameter file must be a mapping, found {:?}", other),
    };
    Ok(node_variants(root)?
        .into_iter()
        .map(|variant| Variant {
            params: variant.params.mark_from_file(),
            ..variant
        })
        .collect())
}

pub fn load_variants(path: &Path) -> Result<Vec<Variant>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read parameter file: {}", path.display()))?;
    variants_from_yaml_str(&content)
        .with_context(|| format!("Invalid parameter file: {}", path.display()))
}

fn node_variants(mapping: &serde_yaml::Mapping) -> Result<Vec<Variant>> {
    use serde_yaml::Value;

    let mut own = Params::new();
    let mut children = Vec::new();
    for (key, value) in mapping {
        let key = match key {
            Value::String(s) => s.as_str(),
            other => bail!("parameter keys must be strings, found {:?}", other),
        };
        match value {
            Value::Mapping(child) => children.push((child, false)),
            Value::Tagged(tagged) => match &tagged.value {
                Value::Mapping(child) => children.push((child, tagged.tag == "mux")),
                Value::Null => {}
                leaf => {
                    if let Some(v) = yaml_leaf(leaf)? {
                        own.insert(key, v);
                    }
                }
            },
            leaf => {
                if let Some(v) = yaml_leaf(leaf)? {
                    own.insert(key, v);
                }
            }
        }
    }

    let mut variants = vec![Variant {
        path: vec![],
        params: own,
    }];
    for (child, is_mux) in children {
        let alternatives = if is_mux {
            mux_variants(child)?
        } else {
            node_variants(child)?
        };
        if alternatives.is_empty() {
            continue;
        }
        let mut combined = Vec::with_capacity(variants.len() * alternatives.len());
        for base in &variants {
            for alternative in &alternatives {
                let mut params = base.params.clone();
                params.merge(&alternative.params);
                let mut path = base.path.clone();
                path.extend(alternative.path.iter().cloned());
                combined.push(Variant { path, params });
            }
        }
        variants = combined;
    }
    Ok(variants)
}

fn mux_variants(mapping: &serde_yaml::Mapping) -> Result<Vec<Variant>> {
    use serde_yaml::Value;

    let mut variants = Vec::new();
    for (key, value) in mapping {
        let name = match key {
            Value::String(s) => s.clone(),
            other => bail!("variant names must be strings, found {:?}", other),
        };
        let node = match value {
            Value::Mapping(node) => node.clone(),
            Value::Tagged(tagged) => match &tagged.value {
                Value::Mapping(node) => node.clone(),
                _ => bail!("variant '{}' must be a mapping", name),
            },
            Value::Null => serde_yaml::Mapping::new(),
            _ => bail!("variant '{}' must be a mapping", name),
        };
        for mut variant in node_variants(&node)? {
            variant.path.insert(0, name.clone());
            variants.push(variant);
        }
    }
    Ok(variants)
}

fn yaml_leaf(value: &serde_yaml::Value) -> Result<Option<ParamValue>> {
    use serde_yaml::Value;

    Ok(match value {
        Value::Null => None,
        Value::Bool(b) => Some(ParamValue::Bool(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(ParamValue::Int(i))
            } else if let Some(f) = n.as_f64() {
                Some(ParamValue::Float(f))
            } else {
                bail!("unsupported number: {}", n)
            }
        }
        Value::String(s) => Some(ParamValue::Str(s.clone())),
        Value::Sequence(items) => {
            let mut list = Vec::with_capacity(items.len());
            for item in items {
                if let Some(v) = yaml_leaf(item)? {
                    list.push(v);
                }
            }
            Some(ParamValue::List(list))
        }
        Value::Tagged(tagged) => yaml_leaf(&tagged.value)?,
        Value::Mapping(_) => bail!("nested mapping inside a list is not a valid parameter"),
    })
}

/// Deserializes either a comma separated string (`"pci,slot"`) or a list into
/// a list of strings. Empty items are dropped, so `""` is an empty list.
///
/// 将逗号分隔的字符串（`"pci,slot"`）或列表反序列化为字符串列表。
/// 空项会被丢弃，因此 `""` 表示空列表。
pub fn string_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde_json::Value;

    fn scalar(value: &Value) -> String {
        match value {
            Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        }
    }

    let value = Value::deserialize(deserializer)?;
    let items = match value {
        Value::Null => Vec::new(),
        Value::String(s) => s.split(',').map(|p| p.trim().to_string()).collect(),
        Value::Array(items) => items.iter().map(scalar).collect(),
        other => vec![scalar(&other)],
    };
    Ok(items.into_iter().filter(|s| !s.is_empty()).collect())
}

/// Represents a single test case in the suite configuration.
/// 代表套件配置中的单个测试用例。
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CaseEntry {
    /// The unique name for the test case, used in logs and reports.
    /// 测试用例的唯一名称，用于日志和报告。
    pub name: String,
    /// The built-in case kind implementing this case (see `kernel-test-runner list`).
    /// 实现该用例的内置用例类型（见 `kernel-test-runner list`）。
    pub kind: String,
    /// An optional YAML parameter file, relative to the suite file.
    /// 可选的 YAML 参数文件，路径相对于套件文件。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<PathBuf>,
    /// Inline parameters, applied on top of the parameter file.
    /// 内联参数，覆盖参数文件中的同名值。
    #[serde(default, skip_serializing_if = "Params::is_empty")]
    pub with: Params,
    /// An optional timeout in seconds for the whole case (setup and run).
    /// 整个用例（setup 和运行）的可选超时时间（秒）。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// CPU architectures this case applies to (e.g. "x86_64", "ppc64le").
    /// Empty means every architecture.
    /// 该用例适用的 CPU 架构，为空表示所有架构。
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arch: Vec<String>,
    /// Free-form tags used by `run --tags`.
    /// 供 `run --tags` 使用的自由标签。
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Distributions (by os-release `ID`) on which a failure does not fail the run.
    /// 在这些发行版（按 os-release 的 `ID`）上失败不会导致整个运行失败。
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow_failure: Vec<String>,
    /// The variant of the parameter file this entry runs, once expanded.
    #[serde(skip)]
    pub variant: Option<Variant>,
    /// Directory that relative local paths in the parameters are taken from.
    /// 参数中相对本地路径所基于的目录。
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl CaseEntry {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            params: None,
            with: Params::new(),
            timeout_secs: None,
            arch: vec![],
            tags: vec![],
            allow_failure: vec![],
            variant: None,
            base_dir: None,
        }
    }

    /// Loads the parameter file (if any) and overlays the inline `with` table.
    /// A file with several variants must be expanded first.
    pub fn resolve_params(&self) -> Result<Params> {
        let mut params = match (&self.variant, &self.params) {
            (Some(variant), _) => variant.params.clone(),
            (None, Some(path)) => {
                let mut variants = load_variants(path)?;
                if variants.len() != 1 {
                    bail!(
                        "{} defines {} variants; load the suite with `load_test_suite` to run each one",
                        path.display(),
                        variants.len()
                    );
                }
                variants.remove(0).params
            }
            (None, None) => Params::new(),
        };
        params.merge(&self.with);
        Ok(params)
    }

    /// Splits the entry into one entry per variant of its parameter file, named
    /// `<case>/<variant path>`. Entries without variants come back unchanged.
    pub fn expand_variants(self) -> Result<Vec<CaseEntry>> {
        let Some(path) = &self.params else {
            return Ok(vec![self]);
        };
        let variants =
            load_variants(path).with_context(|| format!("case '{}'", self.name))?;
        Ok(variants
            .into_iter()
            .map(|variant| {
                let mut entry = self.clone();
                if !variant.path.is_empty() {
                    entry.name = format!("{}/{}", self.name, variant.id());
                }
                entry.variant = Some(variant);
                entry
            })
            .collect())
    }

    pub fn allows_failure_on(&self, distro: &str) -> bool {
        self.allow_failure.iter().any(|d| d.eq_ignore_ascii_case(distro))
    }
}

/// Represents the whole suite configuration, loaded from a TOML file.
/// 代表从 TOML 文件加载的整个套件配置。
#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TestSuite {
    /// The language for the runner's output messages (e.g., "en", "zh-CN").
    /// 运行器输出消息的语言（例如 "en", "zh-CN"）。
    #[serde(default = "default_language")]
    pub language: String,

    /// Where per-case work directories, logs and `results.json` are written.
    /// 每个用例的工作目录、日志和 `results.json` 的写入位置。
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Where fetched assets are cached between runs.
    /// 获取的资源在多次运行之间的缓存位置。
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// All the test cases that may be executed.
    /// 所有可能被执行的测试用例。
    pub cases: Vec<CaseEntry>,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("kernel-test-results")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("~/.cache/kernel-test-runner")
}

/// Parses a suite from TOML text. Relative paths stay relative.
pub fn parse_test_suite(content: &str) -> Result<TestSuite> {
    let suite: TestSuite = toml::from_str(content).context("Failed to parse suite TOML")?;

    let mut seen = HashSet::new();
    for case in &suite.cases {
        if case.name.trim().is_empty() {
            bail!("a case of kind '{}' has an empty name", case.kind);
        }
        if !seen.insert(case.name.as_str()) {
            bail!("duplicate case name '{}'", case.name);
        }
    }
    Ok(suite)
}

/// Loads a suite file and resolves every path in it: `~` is expanded, and
/// relative paths are taken relative to the directory holding the suite file.
pub fn load_test_suite(path: &Path) -> Result<TestSuite> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read suite file: {}", path.display()))?;
    let mut suite = parse_test_suite(&content)
        .with_context(|| format!("Invalid suite file: {}", path.display()))?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    suite.output_dir = resolve_path(base, &suite.output_dir);
    suite.cache_dir = resolve_path(base, &suite.cache_dir);
    let mut expanded = Vec::with_capacity(suite.cases.len());
    for mut case in std::mem::take(&mut suite.cases) {
        if let Some(params) = &case.params {
            case.params = Some(resolve_path(base, params));
        }
        case.base_dir = Some(base.to_path_buf());
        expanded.extend(case.expand_variants()?);
    }
    suite.cases = expanded;
    Ok(suite)
}

/// Resolves a local path found in case parameters against `base`. Anything with
/// a URL scheme is left alone.
pub fn local_location(base: Option<&Path>, location: &str) -> String {
    if location.contains("://") {
        return location.to_string();
    }
    match base {
        Some(base) => resolve_path(base, Path::new(location))
            .to_string_lossy()
            .into_owned(),
        None => location.to_string(),
    }
}

/// Expands `~` and environment variables, then anchors relative paths at `base`.
pub fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw)
        .map(|s| PathBuf::from(s.as_ref()))
        .unwrap_or_else(|_| path.to_path_buf());
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}
