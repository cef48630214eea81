// kegsmith-core/src/test_support.rs
use std::collections::HashSet;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Mutex;

use flate2::write::GzEncoder;
use flate2::Compression;
use kegsmith_common::error::{KegError, Result};
use kegsmith_common::model::{Formula, InstallStep, ResourceSpec, RuntimeRequirement, TestAssertion};
use kegsmith_net::{sha256_hex, MemorySource};

use crate::runtime::{RuntimeHandle, RuntimeProvider};

pub const SOURCE_URL: &str = "https://files.example.org/founder-os-1.0.0.tar.gz";

pub fn tar_gz(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, path, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

pub fn source_archive() -> Vec<u8> {
    tar_gz(&[
        ("founder-os-1.0.0/main.py", b"print('founder-os')\n"),
        ("founder-os-1.0.0/README.md", b"# founder-os\n"),
        ("founder-os-1.0.0/agents/__init__.py", b""),
    ])
}

pub fn resource_url(name: &str) -> String {
    format!("https://files.example.org/{name}-1.0.tar.gz")
}

/// A founder-os formula whose checksums match `source` and the resource bodies.
pub fn sample_formula(resources: &[(&str, &[u8])], source: &[u8]) -> Formula {
    let mut install = vec![InstallStep::CreateRuntime { runtime: None }];
    if !resources.is_empty() {
        install.push(InstallStep::InstallResources);
    }
    install.push(InstallStep::InstallFiles);
    install.push(InstallStep::WriteLauncher {
        name: "founder-os".to_string(),
        entry_point: "main.py".to_string(),
    });

    Formula {
        name: "founder-os".to_string(),
        version: "1.0.0".to_string(),
        desc: Some("AI Chief of Staff".to_string()),
        homepage: None,
        url: SOURCE_URL.to_string(),
        sha256: sha256_hex(source),
        license: Some("MIT".to_string()),
        head: None,
        dependencies: vec!["python@3.11".to_string()],
        resources: resources
            .iter()
            .map(|(name, body)| ResourceSpec::new(*name, resource_url(name), sha256_hex(body)))
            .collect(),
        install,
        post_install: vec!["founder-os installed to {prefix}".to_string()],
        caveats: Some("Run {name} from any directory.".to_string()),
        test: vec![TestAssertion::FileExists {
            path: "main.py".to_string(),
        }],
    }
}

/// Serves the source archive plus each `(name, bytes)` at its resource URL.
pub fn sample_source(source: &[u8], served: &[(&str, &[u8])]) -> MemorySource {
    served.iter().fold(
        MemorySource::new().with(SOURCE_URL, source.to_vec()),
        |src, (name, body)| src.with(&resource_url(name), body.to_vec()),
    )
}

/// Runtime provider that fakes a venv on disk and records what it installs.
#[derive(Debug, Default)]
pub struct FakeRuntime {
    installed: Mutex<Vec<String>>,
    modules: HashSet<String>,
    failing: Option<String>,
    unavailable: bool,
}

impl FakeRuntime {
    pub fn with_modules(mut self, modules: &[&str]) -> Self {
        self.modules.extend(modules.iter().map(|m| m.to_string()));
        self
    }

    pub fn failing_install(mut self, resource: &str) -> Self {
        self.failing = Some(resource.to_string());
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn installed(&self) -> Vec<String> {
        self.installed.lock().unwrap().clone()
    }
}

impl RuntimeProvider for FakeRuntime {
    async fn create_runtime(
        &self,
        prefix: &Path,
        requirement: &RuntimeRequirement,
    ) -> Result<RuntimeHandle> {
        if self.unavailable {
            return Err(KegError::RuntimeUnavailable {
                runtime: requirement.to_string(),
                hint: "install it".to_string(),
            });
        }
        let handle = RuntimeHandle::for_libexec(Formula::libexec_path(prefix));
        fs::create_dir_all(handle.bin_dir())?;
        fs::write(&handle.interpreter, "#!/bin/sh\n")?;
        fs::set_permissions(&handle.interpreter, fs::Permissions::from_mode(0o755))?;
        Ok(handle)
    }

    async fn install_resource(
        &self,
        runtime: &RuntimeHandle,
        resource: &ResourceSpec,
        archive: &Path,
    ) -> Result<()> {
        if self.failing.as_deref() == Some(resource.name.as_str()) {
            return Err(KegError::CommandFailed {
                command: format!("pip install {}", archive.display()),
                status: "exit status: 1".to_string(),
                stderr: "build failed".to_string(),
            });
        }
        let site = runtime.root.join("lib/site-packages");
        fs::create_dir_all(&site)?;
        fs::write(site.join(format!("{}.installed", resource.name)), fs::read(archive)?)?;
        self.installed.lock().unwrap().push(resource.name.clone());
        Ok(())
    }

    async fn check_import(&self, _runtime: &RuntimeHandle, module: &str) -> Result<bool> {
        Ok(self.modules.contains(module))
    }
}
