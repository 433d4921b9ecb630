//! A loaded project: root directory plus validated configuration, and the
//! pieces of the pipeline derived from them.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_config::{CliOverrides, ConfigLoader, KilnConfig, resolve};
use kiln_core::{
    BuildStepRegistry, Category, ModuleHandle, ModuleRunner, ServerConfig, SourceRootMap,
};
use kiln_modules::{ImageModule, SpriteModule};

use crate::cli::Cli;
use crate::error::{BuildError, CliError, Result};
use crate::scan::IgnoreRules;
use crate::steps::{CommandStep, CopyStep, StyleAssembler};
use crate::ui;

#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    pub config: KilnConfig,
}

impl Project {
    /// Resolve the project root from `--cwd` and load its configuration.
    pub fn load(cli: &Cli, overrides: CliOverrides) -> Result<Self> {
        let current = std::env::current_dir()?;
        let root = match &cli.cwd {
            Some(dir) => resolve(&current, dir),
            None => current,
        };

        if !root.is_dir() {
            return Err(CliError::FileNotFound(root));
        }

        let config = ConfigLoader::new(&root)
            .config_path(cli.config.as_ref())
            .overrides(overrides)
            .load()?;

        Ok(Self { root, config })
    }

    pub fn new(root: impl Into<PathBuf>, config: KilnConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    pub fn roots(&self) -> SourceRootMap {
        self.config.source_roots(&self.root)
    }

    pub fn ignore_rules(&self) -> IgnoreRules {
        IgnoreRules::new(self.config.dev.watch_ignore.iter().cloned())
    }

    pub fn dist(&self) -> PathBuf {
        self.path(&self.config.dist)
    }

    fn path(&self, path: &Path) -> PathBuf {
        resolve(&self.root, path)
    }

    /// One step per compiled category that has a command, plus the static
    /// copy step.
    pub fn registry(&self) -> BuildStepRegistry {
        let mut registry = BuildStepRegistry::new();

        for category in [Category::Template, Category::Style, Category::Script] {
            let (Some(src), Some(dest)) = (
                self.config.source_dir(category),
                self.config.dist_dir(category),
            ) else {
                continue;
            };
            let src = self.path(src);

            let Some(template) = self.config.compilers.for_category(category) else {
                if src.is_dir() {
                    ui::warning(&BuildError::MissingCompiler { category, root: src }.to_string());
                }
                continue;
            };

            let mut step = CommandStep::new(category, template, &src, &self.path(dest), &self.root)
                .with_production(self.config.production);
            if category == Category::Style {
                if let Some(index) = &self.config.assemble_styles {
                    step = step.with_assembler(StyleAssembler::new(&src, self.path(index)));
                }
            }

            tracing::debug!("Registered {} step: {}", category, step.command());
            registry.register(category, Arc::new(step));
        }

        let statics = self
            .config
            .static_folders
            .iter()
            .map(|folder| self.path(folder))
            .collect();
        registry.register(Category::StaticAsset, Arc::new(CopyStep::new(statics, self.dist())));

        registry
    }

    /// Every configured module, inheriting the top-level debug flag.
    pub fn modules(&self) -> ModuleRunner {
        let debug = self.config.debug;
        let mut runner = ModuleRunner::new(debug);

        if let Some(images) = &self.config.modules.images {
            runner.register(ModuleHandle::new(ImageModule::from_options(
                images, &self.root, debug,
            )));
        }
        if let Some(sprites) = &self.config.modules.sprites {
            runner.register(ModuleHandle::new(SpriteModule::from_options(
                sprites, &self.root, debug,
            )));
        }

        runner
    }

    /// Resolve `dev.host:dev.port` for the lifecycle.
    pub fn server_config(&self) -> Result<ServerConfig> {
        let dev = &self.config.dev;
        let addr: SocketAddr = (dev.host.as_str(), dev.port)
            .to_socket_addrs()
            .map_err(|e| CliError::InvalidArgument(format!("cannot resolve {}: {}", dev.host, e)))?
            .next()
            .ok_or_else(|| CliError::InvalidArgument(format!("{} has no address", dev.host)))?;

        Ok(ServerConfig::new(addr).with_stop_timeout(dev.stop_timeout()))
    }
}
