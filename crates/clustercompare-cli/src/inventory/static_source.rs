//! File/directory/stdin `ClusterInventory` source (§4.K):
//! `-f/--filename`, `-R/--recursive`, and `-f -` for stdin.

use std::io::Read;
use std::path::{Path, PathBuf};

use clustercompare_core::StaticInventory;
use serde::Deserialize;

use crate::error::{CliError, Result};

pub fn load(filenames: &[String], recursive: bool) -> Result<StaticInventory> {
    let mut resources = Vec::new();
    for filename in filenames {
        if filename == "-" {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            resources.extend(parse_yaml_documents(&buf)?);
            continue;
        }

        let path = PathBuf::from(filename);
        if path.is_dir() {
            collect_from_dir(&path, recursive, &mut resources)?;
        } else {
            let contents = std::fs::read_to_string(&path)?;
            resources.extend(parse_yaml_documents(&contents)?);
        }
    }
    Ok(StaticInventory::new(resources))
}

fn collect_from_dir(dir: &Path, recursive: bool, out: &mut Vec<serde_json::Value>) -> Result<()> {
    let walker = if recursive { walkdir::WalkDir::new(dir) } else { walkdir::WalkDir::new(dir).max_depth(1) };
    for entry in walker {
        let entry = entry.map_err(|e| CliError::usage(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_yaml = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
        if !is_yaml {
            continue;
        }
        let contents = std::fs::read_to_string(entry.path())?;
        out.extend(parse_yaml_documents(&contents)?);
    }
    Ok(())
}

/// A manifest file may hold several `---`-separated YAML documents.
fn parse_yaml_documents(text: &str) -> Result<Vec<serde_json::Value>> {
    let mut out = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        out.push(serde_json::to_value(value).map_err(clustercompare_core::CoreError::from)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clustercompare_core::ClusterInventory;
    use std::io::Write;

    #[test]
    fn loads_multi_document_manifest_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: b\n").unwrap();

        let inventory = load(&[path.to_str().unwrap().to_string()], false).unwrap();
        assert_eq!(inventory.all_resources().len(), 2);
    }

    #[test]
    fn non_recursive_directory_scan_skips_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("top.yaml"), "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: top\n").unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("deep.yaml"), "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: deep\n").unwrap();

        let shallow = load(&[dir.path().to_str().unwrap().to_string()], false).unwrap();
        assert_eq!(shallow.all_resources().len(), 1);

        let deep = load(&[dir.path().to_str().unwrap().to_string()], true).unwrap();
        assert_eq!(deep.all_resources().len(), 2);
    }
}
