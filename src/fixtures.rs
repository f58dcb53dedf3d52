#[cfg(test)]
pub mod test {
    use std::fs;

    use tempfile::TempDir;

    use crate::fragment::FragmentStore;

    /// Relative path of the sample root fragment.
    pub const ROOT: &str = "config.yaml";

    /// A small shop-style layout: a root with two group selections plus its
    /// own keys, a spare db option, and an unreferenced top-level fragment.
    pub fn sample_files() -> Vec<(&'static str, &'static str)> {
        vec![
            (
                ROOT,
                "defaults:\n  - db: mysql\n  - server: default\napp:\n  name: shop\ndb:\n  pool: 12\n",
            ),
            (
                "db/mysql.yaml",
                "driver: mysql\nport: 3306\nopts:\n  timeout: 30\n",
            ),
            ("db/postgres.yaml", "driver: postgres\nport: 5432\n"),
            ("server/default.yaml", "host: localhost\nworkers: 2\n"),
            ("logging.yaml", "logging:\n  level: info\n"),
        ]
    }

    /// Build a store from `(relative path, text)` pairs.
    pub fn store_from(files: &[(&str, &str)]) -> FragmentStore {
        let mut store = FragmentStore::new();
        for (rel, text) in files {
            store.load(*rel, *text);
        }
        store
    }

    /// The sample layout as an in-memory store.
    pub fn sample_store() -> FragmentStore {
        store_from(&sample_files())
    }

    /// Write `(relative path, text)` pairs into a fresh temp directory.
    pub fn write_dir(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (rel, text) in files {
            let path = dir.path().join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&path, text).unwrap();
        }
        dir
    }

    /// The sample layout on disk.
    pub fn sample_dir() -> TempDir {
        write_dir(&sample_files())
    }
}
