//! Package catalogues.
//!
//! A catalogue is a TOML file declaring packages as data. Declaration order
//! is build order, and string settings may refer to packages declared
//! earlier:
//!
//! | Placeholder       | Expands to                               |
//! |-------------------|------------------------------------------|
//! | `{prefix}`        | this package's install directory         |
//! | `{install:NAME}`  | install directory of package `NAME`      |
//! | `{include:NAME}`  | first include directory of `NAME`        |
//! | `{lib:NAME}`      | first library directory of `NAME`        |
//!
//! ```toml
//! [[package]]
//! name = "zlib"
//! version = "1.2.11"
//! capabilities = ["autotools"]
//! archives = [{ url = "https://zlib.net/zlib-1.2.11.tar.gz" }]
//!
//! [[package]]
//! name = "libpng"
//! version = "1.6.37"
//! capabilities = ["autotools"]
//! archives = [{ url = "https://download.sourceforge.net/libpng/libpng-1.6.37.tar.xz" }]
//! cflags = ["-I{include:zlib}"]
//! ldflags = ["-L{lib:zlib}"]
//!
//! [package.macos]
//! configure_args = ["--disable-arm-neon"]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use url::Url;

use crate::package::{BuildContext, CapabilityId, Package, SourceArchive};
use crate::platform::OsFamily;

#[derive(Debug, Clone, Default, Deserialize)]
struct CatalogueFile {
    #[serde(default, rename = "package")]
    packages: Vec<PackageSpec>,
}

/// One `[[package]]` entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageSpec {
    pub name: String,
    pub version: String,

    /// Capability names, later entries taking precedence
    #[serde(default)]
    pub capabilities: Vec<String>,

    #[serde(default)]
    pub archives: Vec<ArchiveSpec>,

    /// Main source directory relative to the extraction directory
    pub source_dir: Option<String>,

    #[serde(default)]
    pub build_in_source: bool,

    /// Install into the tree of an earlier package
    pub install_into: Option<String>,

    pub include_dirs: Option<Vec<String>>,
    pub lib_dirs: Option<Vec<String>>,

    pub configure_script: Option<String>,
    pub configure_interpreter: Option<String>,

    #[serde(flatten)]
    pub options: Options,

    /// Appended on Linux hosts
    pub linux: Option<Options>,
    /// Appended on macOS hosts
    pub macos: Option<Options>,
    /// Appended on Windows hosts
    pub windows: Option<Options>,

    pub verify: Option<VerifySpec>,
}

/// A source archive. `file` defaults to the last URL path segment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArchiveSpec {
    pub url: String,
    pub file: Option<String>,
    pub sha256: Option<String>,
}

/// Settings that per-OS tables can extend.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Options {
    #[serde(default)]
    pub configure_args: Vec<String>,
    #[serde(default)]
    pub cmake_args: Vec<String>,
    #[serde(default)]
    pub cflags: Vec<String>,
    #[serde(default)]
    pub cxxflags: Vec<String>,
    #[serde(default)]
    pub ldflags: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub env_remove: Vec<String>,
    #[serde(default)]
    pub make_args: Vec<String>,
    #[serde(default)]
    pub install_args: Vec<String>,
    #[serde(default)]
    pub prune: Vec<String>,
    #[serde(default)]
    pub patch: Vec<PatchSpec>,
}

impl Options {
    fn extend(&mut self, other: &Options) {
        self.configure_args.extend(other.configure_args.iter().cloned());
        self.cmake_args.extend(other.cmake_args.iter().cloned());
        self.cflags.extend(other.cflags.iter().cloned());
        self.cxxflags.extend(other.cxxflags.iter().cloned());
        self.ldflags.extend(other.ldflags.iter().cloned());
        self.env
            .extend(other.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.env_remove.extend(other.env_remove.iter().cloned());
        self.make_args.extend(other.make_args.iter().cloned());
        self.install_args.extend(other.install_args.iter().cloned());
        self.prune.extend(other.prune.iter().cloned());
        self.patch.extend(other.patch.iter().cloned());
    }
}

/// Literal substitutions in one file of the main source directory.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatchSpec {
    pub file: String,
    pub replace: Vec<(String, String)>,
}

/// Health check: run `program` with `stdin`, require success and, if set,
/// `expect` in its stdout and `expect_stderr` in its stderr.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifySpec {
    pub program: String,
    #[serde(default)]
    pub stdin: String,
    pub expect: Option<String>,
    pub expect_stderr: Option<String>,
}

impl PackageSpec {
    /// Base options plus the table for `os`.
    pub fn options_for(&self, os: OsFamily) -> Options {
        let mut options = self.options.clone();
        let extra = match os {
            OsFamily::Linux => &self.linux,
            OsFamily::Macos => &self.macos,
            OsFamily::Windows => &self.windows,
        };
        if let Some(extra) = extra {
            options.extend(extra);
        }
        options
    }
}

/// An ordered set of package declarations.
#[derive(Debug, Clone)]
pub struct Catalogue {
    path: PathBuf,
    specs: Vec<PackageSpec>,
}

impl Catalogue {
    /// Read and validate a catalogue file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read catalogue: {}", path.display()))?;
        Self::parse(&contents, path)
    }

    /// Parse catalogue text. `path` is used in messages.
    pub fn parse(contents: &str, path: &Path) -> Result<Self> {
        let file: CatalogueFile = toml::from_str(contents)
            .with_context(|| format!("failed to parse catalogue: {}", path.display()))?;

        let mut seen: Vec<&str> = Vec::new();
        for spec in &file.packages {
            if spec.name.is_empty() || spec.version.is_empty() {
                bail!("every package in {} needs a name and a version", path.display());
            }
            if seen.contains(&spec.name.as_str()) {
                bail!("package `{}` is declared twice in {}", spec.name, path.display());
            }
            for capability in &spec.capabilities {
                capability
                    .parse::<CapabilityId>()
                    .map_err(anyhow::Error::msg)
                    .with_context(|| format!("in package `{}`", spec.name))?;
            }
            seen.push(&spec.name);
        }

        Ok(Catalogue {
            path: path.to_path_buf(),
            specs: file.packages,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Package names in build order.
    pub fn names(&self) -> Vec<&str> {
        self.specs.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&PackageSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn specs(&self) -> &[PackageSpec] {
        &self.specs
    }

    /// Compose every package in declaration order.
    pub fn packages(&self, context: &BuildContext) -> Result<Vec<Package>> {
        let mut packages: Vec<Package> = Vec::with_capacity(self.specs.len());
        for spec in &self.specs {
            let package = compose(spec, context, &packages)
                .with_context(|| format!("invalid package `{}` in {}", spec.name, self.path.display()))?;
            packages.push(package);
        }
        Ok(packages)
    }

    /// Compose one package by name, along with the peers it may reference.
    pub fn package(&self, context: &BuildContext, name: &str) -> Result<Package> {
        let index = self
            .specs
            .iter()
            .position(|s| s.name == name)
            .with_context(|| format!("no package named `{}` in {}", name, self.path.display()))?;

        let mut packages: Vec<Package> = Vec::with_capacity(index + 1);
        for spec in &self.specs[..=index] {
            let package = compose(spec, context, &packages)
                .with_context(|| format!("invalid package `{}` in {}", spec.name, self.path.display()))?;
            packages.push(package);
        }
        packages
            .pop()
            .with_context(|| format!("no package named `{}`", name))
    }
}

fn compose(spec: &PackageSpec, context: &BuildContext, peers: &[Package]) -> Result<Package> {
    let prefix = match &spec.install_into {
        Some(peer) => find_peer(peers, peer)?.install_directory(),
        None => context.layout().install_directory(&spec.name, &spec.version),
    };
    let expand = |s: &str| expand(s, &prefix, peers);
    let expand_all = |items: &[String]| -> Result<Vec<String>> {
        items.iter().map(|s| expand(s)).collect()
    };

    let options = spec.options_for(context.platform().os_family());
    let mut builder = Package::builder(context, &spec.name, &spec.version);

    for archive in &spec.archives {
        builder = builder.source_archive(SourceArchive {
            filename: archive_filename(archive)?,
            url: archive.url.clone(),
            sha256: archive.sha256.clone(),
        });
    }

    if let Some(dir) = &spec.source_dir {
        builder = builder.source_dir(expand(dir)?);
    }
    builder = builder.build_in_source(spec.build_in_source);
    if spec.install_into.is_some() {
        builder = builder.install_directory(&prefix);
    }
    if let Some(dirs) = &spec.include_dirs {
        builder = builder.include_directories(expand_all(dirs)?.into_iter().map(PathBuf::from).collect());
    }
    if let Some(dirs) = &spec.lib_dirs {
        builder = builder.library_directories(expand_all(dirs)?.into_iter().map(PathBuf::from).collect());
    }
    if let Some(script) = &spec.configure_script {
        builder = builder.configure_script(expand(script)?);
    }
    if let Some(interpreter) = &spec.configure_interpreter {
        builder = builder.configure_interpreter(expand(interpreter)?);
    }

    builder = builder
        .configure_args(expand_all(&options.configure_args)?)
        .cmake_args(expand_all(&options.cmake_args)?)
        .cflags(expand_all(&options.cflags)?)
        .cxxflags(expand_all(&options.cxxflags)?)
        .ldflags(expand_all(&options.ldflags)?)
        .make_args(expand_all(&options.make_args)?)
        .install_args(expand_all(&options.install_args)?);

    for (key, value) in &options.env {
        builder = builder.env(key, expand(value)?);
    }
    for key in &options.env_remove {
        builder = builder.env_remove(key);
    }
    for path in &options.prune {
        builder = builder.prune(expand(path)?);
    }
    for patch in &options.patch {
        let substitutions = patch
            .replace
            .iter()
            .map(|(old, new)| -> Result<(String, String)> { Ok((expand(old)?, expand(new)?)) })
            .collect::<Result<Vec<_>>>()?;
        builder = builder.patch(&patch.file, &substitutions);
    }

    for name in &spec.capabilities {
        let id: CapabilityId = name.parse().map_err(anyhow::Error::msg)?;
        builder = builder.shared_capability(id.instantiate());
    }

    if let Some(verify) = &spec.verify {
        let program = PathBuf::from(expand(&verify.program)?);
        let stdin = verify.stdin.clone();
        let expect = verify.expect.clone();
        let expect_stderr = verify.expect_stderr.clone();
        builder = builder.verify(move |cx| {
            let probe = cx.probe(&program, &stdin)?;
            tracing::debug!("{} printed: {}", program.display(), probe.stdout.trim());
            let found = |wanted: &Option<String>, output: &str| {
                wanted.as_deref().is_none_or(|wanted| output.contains(wanted))
            };
            Ok(probe.status.success()
                && found(&expect, &probe.stdout)
                && found(&expect_stderr, &probe.stderr))
        });
    }

    Ok(builder.compose()?)
}

fn find_peer<'a>(peers: &'a [Package], name: &str) -> Result<&'a Package> {
    peers
        .iter()
        .find(|p| p.name() == name)
        .with_context(|| format!("`{}` is not declared before this package", name))
}

/// The cache file name for an archive.
fn archive_filename(archive: &ArchiveSpec) -> Result<String> {
    if let Some(file) = &archive.file {
        if file.is_empty() || file == "." || file == ".." || file.contains(['/', '\\']) {
            bail!("archive file `{}` must be a plain file name", file);
        }
        return Ok(file.clone());
    }
    let url = Url::parse(&archive.url)
        .with_context(|| format!("invalid archive URL `{}`", archive.url))?;
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .with_context(|| format!("cannot derive a file name from `{}`; set `file`", archive.url))
}

/// Substitute `{prefix}` and `{install|include|lib:NAME}` placeholders.
///
/// Other brace groups, such as shell `${VAR}`, are left alone.
fn expand(input: &str, prefix: &Path, peers: &[Package]) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return Ok(out);
        };
        let token = &after[..end];

        let replacement = match token.split_once(':') {
            None if token == "prefix" => Some(prefix.display().to_string()),
            Some(("install", name)) => Some(find_peer(peers, name)?.install_directory().display().to_string()),
            Some(("include", name)) => Some(first_dir(find_peer(peers, name)?.include_directories(), name)?),
            Some(("lib", name)) => Some(first_dir(find_peer(peers, name)?.library_link_directories(), name)?),
            _ => None,
        };

        match replacement {
            Some(value) => out.push_str(&value),
            None => {
                out.push('{');
                out.push_str(token);
                out.push('}');
            }
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

fn first_dir(dirs: Vec<PathBuf>, name: &str) -> Result<String> {
    dirs.first()
        .map(|d| d.display().to_string())
        .with_context(|| format!("`{}` declares no such directories", name))
}
