//! Print (or write) the Kubernetes manifests of one tenant without touching a cluster.
use std::path::PathBuf;
use anyhow::Context;
use clap::Parser;
use tenant_control_plane::{config::Settings, manifests, models::TenantDescriptor, resources::SpecBuilder};

#[derive(Parser, Debug)]
#[command(name = "render-manifests", version, about = "Render a tenant's Kubernetes manifests as YAML")]
struct Args {
    /// Tenant name, also the namespace
    tenant: String,
    /// Frontend host; derived from MAIN_DOMAIN when absent
    #[arg(long)]
    domain: Option<String>,
    /// API host; derived from MAIN_DOMAIN when absent
    #[arg(long)]
    api_domain: Option<String>,
    /// Write one file per object under <out>/<tenant>/ instead of printing a stream
    #[arg(long)]
    out: Option<PathBuf>,
}

impl Args {
    fn descriptor(&self) -> TenantDescriptor {
        TenantDescriptor { name: self.tenant.clone(), domain: self.domain.clone(), api_domain: self.api_domain.clone() }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let settings = Settings::from_env()?;
    let resources = SpecBuilder::new(settings.builder).build(&args.descriptor())?;
    let rendered = manifests::render(&resources)?;
    match &args.out {
        None => print!("{}", manifests::to_stream(&rendered)),
        Some(dir) => {
            let dir = dir.join(&resources.namespace);
            std::fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
            for m in &rendered {
                let path = dir.join(m.file_name);
                std::fs::write(&path, &m.yaml).with_context(|| format!("write {}", path.display()))?;
                eprintln!("wrote {}", path.display());
            }
        }
    }
    Ok(())
}
