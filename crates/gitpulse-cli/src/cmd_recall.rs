use gitpulse_core::config::Config;
use gitpulse_core::MemoryStore;
use gitpulse_store::FileMemoryStore;

pub fn execute(config: &Config, key: Option<&str>, list: bool) -> anyhow::Result<()> {
    let store = FileMemoryStore::new(&config.store_dir);
    if list {
        for key in store.keys()? {
            println!("{key}");
        }
        return Ok(());
    }
    let Some(key) = key else {
        anyhow::bail!("a key is required (or pass --list)");
    };
    let record = tokio::runtime::Runtime::new()?.block_on(store.recall(key))?;
    match record {
        Some(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        None => anyhow::bail!("nothing stored under {key}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config {
            store_dir: tmp.path().to_path_buf(),
            ..Config::default()
        };
        assert!(execute(&config, Some("acme-widget-1"), false).is_err());
        assert!(execute(&config, None, false).is_err());
        assert!(execute(&config, None, true).is_ok());
    }
}
