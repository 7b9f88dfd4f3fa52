//! A script used to generate the CRDs used by this project.
//!
//! Any time a CRD spec changes, this script can be run to ensure that the CRDs are up-to-date and
//! ready to be synced with the cluster. The output directory defaults to `crds` and may be
//! overridden by the first argument.

use anyhow::{Context, Result};
use kube::CustomResourceExt;
use redis_core::crd::{RedisSentinel, RedisStandalone};

fn main() -> Result<()> {
    let crds_path = std::env::args().nth(1).unwrap_or_else(|| "crds".into());
    let crds_path = std::path::PathBuf::from(crds_path);
    std::fs::create_dir_all(&crds_path).with_context(|| format!("error creating CRD output dir {:?}", &crds_path))?;

    let standalone = RedisStandalone::crd();
    let standalone_yaml = serde_yaml::to_string(&standalone).context("error serializing RedisStandalone CRD to yaml")?;
    std::fs::write(crds_path.join("redisstandalone.yaml"), &standalone_yaml)
        .with_context(|| format!("error writing RedisStandalone CRD to {:?}", &crds_path))?;
    println!("RedisStandalone CRD written to {:?}", &crds_path);

    let sentinel = RedisSentinel::crd();
    let sentinel_yaml = serde_yaml::to_string(&sentinel).context("error serializing RedisSentinel CRD to yaml")?;
    std::fs::write(crds_path.join("redissentinel.yaml"), &sentinel_yaml)
        .with_context(|| format!("error writing RedisSentinel CRD to {:?}", &crds_path))?;
    println!("RedisSentinel CRD written to {:?}", &crds_path);

    Ok(())
}
