use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::info;

use crate::player_registry::*;

/// In-memory registry, optionally backed by a JSON file.
pub struct LocalPlayerRegistry {
    profiles: HashMap<ChatId, PlayerProfile>,
    path: Option<PathBuf>,
    dirty: bool,
}

impl LocalPlayerRegistry {
    pub fn new() -> LocalPlayerRegistry {
        LocalPlayerRegistry {
            profiles: HashMap::new(),
            path: None,
            dirty: false,
        }
    }

    /// Loads `path`, starting empty if it does not exist yet.
    pub fn load(path: &Path) -> Result<LocalPlayerRegistry, RegistryError> {
        let profiles: Vec<PlayerProfile> = match fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        info!(
            "Loaded {} registered players from {}",
            profiles.len(),
            path.display()
        );

        Ok(LocalPlayerRegistry {
            profiles: profiles.into_iter().map(|p| (p.player_id, p)).collect(),
            path: Some(path.to_path_buf()),
            dirty: false,
        })
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn profiles_by_earnings<'a>(
        &'a self,
        filter: impl Fn(&PlayerProfile) -> bool,
    ) -> Vec<&'a PlayerProfile> {
        let mut ranked = self.profiles.values().filter(|p| filter(p)).collect::<Vec<_>>();
        ranked.sort_by(|a, b| {
            b.earnings
                .total_cmp(&a.earnings)
                .then_with(|| a.registered_at.cmp(&b.registered_at))
        });
        ranked
    }
}

impl Default for LocalPlayerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerRegistry for LocalPlayerRegistry {
    fn register(
        &mut self,
        player_id: ChatId,
        epic_name: &str,
        region: Region,
    ) -> Result<(bool, PlayerProfile), RegistryError> {
        let epic_name = validate_epic_name(epic_name)?;

        if let Some(owner) = self.get_by_epic_name(&epic_name) {
            if owner.player_id != player_id {
                return Err(RegistryError::EpicNameTaken(epic_name));
            }
        }

        let earnings = self.profiles.get(&player_id).map_or(0.0, |p| p.earnings);
        let profile = PlayerProfile {
            player_id,
            epic_name,
            region,
            earnings,
            registered_at: Utc::now(),
        };
        let is_new = self.profiles.insert(player_id, profile.clone()).is_none();
        self.dirty = true;

        Ok((is_new, profile))
    }

    fn get(&self, player_id: ChatId) -> Option<&PlayerProfile> {
        self.profiles.get(&player_id)
    }

    fn get_by_epic_name(&self, epic_name: &str) -> Option<&PlayerProfile> {
        let wanted = epic_name.trim();
        self.profiles
            .values()
            .find(|p| p.epic_name.eq_ignore_ascii_case(wanted))
    }

    fn delete(&mut self, player_id: ChatId) -> Result<PlayerProfile, RegistryError> {
        let profile = self
            .profiles
            .remove(&player_id)
            .ok_or(RegistryError::NotRegistered)?;
        self.dirty = true;
        Ok(profile)
    }

    fn update_earnings(&mut self, player_id: ChatId, amount: f64) -> Result<f64, RegistryError> {
        let profile = self
            .profiles
            .get_mut(&player_id)
            .ok_or(RegistryError::NotRegistered)?;
        profile.earnings += amount;
        self.dirty = true;
        Ok(profile.earnings)
    }

    fn leaderboard(&self, region: Option<Region>, limit: usize) -> Vec<&PlayerProfile> {
        let mut ranked = self.profiles_by_earnings(|p| region.map_or(true, |r| p.region == r));
        ranked.truncate(limit);
        ranked
    }

    fn players_by_region(&self, region: Region) -> Vec<&PlayerProfile> {
        self.profiles_by_earnings(|p| p.region == region)
    }

    fn player_count(&self) -> usize {
        self.profiles.len()
    }

    fn flush(&mut self) -> Result<(), RegistryError> {
        let Some(path) = self.path.as_ref() else {
            self.dirty = false;
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }

        let mut profiles = self.profiles.values().collect::<Vec<_>>();
        profiles.sort_by_key(|p| p.registered_at);

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        // Write to a sibling and rename so a crash never truncates the file.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&profiles)?)?;
        fs::rename(&tmp, path)?;

        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "scrim-registry-{}-{}-{}.json",
            name,
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ))
    }

    #[test]
    fn register_then_update_keeps_earnings() {
        let mut registry = LocalPlayerRegistry::new();

        let (is_new, _) = registry.register(ChatId(1), "Bugha", Region::NaEast).unwrap();
        assert!(is_new);
        registry.update_earnings(ChatId(1), 250.0).unwrap();

        let (is_new, profile) = registry.register(ChatId(1), "Bugha2", Region::Eu).unwrap();
        assert!(!is_new);
        assert_eq!(profile.earnings, 250.0);
        assert_eq!(profile.region, Region::Eu);
        assert_eq!(registry.player_count(), 1);
    }

    #[test]
    fn epic_names_are_unique_ignoring_case() {
        let mut registry = LocalPlayerRegistry::new();
        registry.register(ChatId(1), "Mongraal", Region::Eu).unwrap();

        let err = registry
            .register(ChatId(2), "mongraal", Region::Eu)
            .unwrap_err();
        assert!(matches!(err, RegistryError::EpicNameTaken(_)));
        assert_eq!(
            registry.get_by_epic_name("MONGRAAL").unwrap().player_id,
            ChatId(1)
        );
    }

    #[test]
    fn delete_unknown_player() {
        let mut registry = LocalPlayerRegistry::new();
        assert!(matches!(
            registry.delete(ChatId(5)),
            Err(RegistryError::NotRegistered)
        ));
        registry.register(ChatId(5), "Someone", Region::Br).unwrap();
        assert_eq!(registry.delete(ChatId(5)).unwrap().epic_name, "Someone");
        assert!(registry.get(ChatId(5)).is_none());
    }

    #[test]
    fn leaderboard_orders_by_earnings() {
        let mut registry = LocalPlayerRegistry::new();
        registry.register(ChatId(1), "low", Region::Eu).unwrap();
        registry.register(ChatId(2), "high", Region::Eu).unwrap();
        registry.register(ChatId(3), "mid", Region::Oce).unwrap();
        registry.update_earnings(ChatId(2), 900.0).unwrap();
        registry.update_earnings(ChatId(3), 300.0).unwrap();
        registry.update_earnings(ChatId(1), 10.0).unwrap();

        let all = registry
            .leaderboard(None, 2)
            .iter()
            .map(|p| p.epic_name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(all, ["high", "mid"]);

        let eu = registry
            .leaderboard(Some(Region::Eu), 10)
            .iter()
            .map(|p| p.epic_name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(eu, ["high", "low"]);
        assert_eq!(registry.players_by_region(Region::Oce).len(), 1);
    }

    #[test]
    fn flush_and_reload() {
        let path = scratch_path("reload");
        let mut registry = LocalPlayerRegistry::load(&path).unwrap();
        assert_eq!(registry.player_count(), 0);

        registry.register(ChatId(42), "Persisted", Region::Asia).unwrap();
        registry.update_earnings(ChatId(42), 12.5).unwrap();
        assert!(registry.is_dirty());
        registry.flush().unwrap();
        assert!(!registry.is_dirty());

        let reloaded = LocalPlayerRegistry::load(&path).unwrap();
        let profile = reloaded.get(ChatId(42)).unwrap();
        assert_eq!(profile.epic_name, "Persisted");
        assert_eq!(profile.region, Region::Asia);
        assert_eq!(profile.earnings, 12.5);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let path = scratch_path("malformed");
        fs::write(&path, b"{ not json").unwrap();

        assert!(matches!(
            LocalPlayerRegistry::load(&path),
            Err(RegistryError::Json(_))
        ));

        let _ = fs::remove_file(&path);
    }
}
