use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
};

use tracing::{debug, warn};

pub const FALLBACK_LOCALE: &str = "en";

/// Messages for one locale preference list, with fallbacks already merged in.
#[derive(Debug, Default)]
pub struct Translation {
    language: Option<String>,
    entries: HashMap<String, String>,
}

impl Translation {
    /// The message for `key`, or the key itself when no bundle has it.
    pub fn get<'a>(&'a self, key: &'a str) -> &'a str {
        self.entries.get(key).map(String::as_str).unwrap_or(key)
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// Value for a `Content-Language` header.
    pub fn content_language(&self) -> Option<String> {
        self.language.as_ref().map(|l| l.replace('_', "-"))
    }
}

type Bundle = HashMap<String, String>;

/// Translation bundles loaded from `{dir}/l10n/{locale}.toml`, with a
/// process-wide cache of merged translations keyed by the bundles used.
pub struct L10n {
    bundles: HashMap<String, Bundle>,
    supported: Vec<(String, String)>,
    cache: RwLock<HashMap<Vec<String>, Arc<Translation>>>,
}

impl L10n {
    /// Earlier directories override later ones.
    pub fn load(dirs: &[PathBuf]) -> Self {
        let mut bundles: HashMap<String, Bundle> = HashMap::new();
        for dir in dirs.iter().rev() {
            for (locale, bundle) in read_bundles(&dir.join("l10n")) {
                bundles.entry(locale).or_default().extend(bundle);
            }
        }
        Self::from_bundles(bundles)
    }

    pub fn from_bundles(bundles: HashMap<String, Bundle>) -> Self {
        let mut supported: Vec<(String, String)> = bundles
            .iter()
            .map(|(locale, bundle)| {
                let name = bundle
                    .get(&format!("language_{locale}"))
                    .cloned()
                    .unwrap_or_else(|| locale.clone());
                (locale.clone(), name)
            })
            .collect();
        supported.sort_by(|a, b| a.1.cmp(&b.1));
        Self {
            bundles,
            supported,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// `(locale, display name)` pairs sorted by display name.
    pub fn supported_locales(&self) -> &[(String, String)] {
        &self.supported
    }

    /// Merged translation for a preference list. Lists that resolve to the
    /// same installed bundles share one cache entry.
    pub fn translation(&self, locales: &[String]) -> Arc<Translation> {
        let chain = self.resolve(locales);
        if let Some(cached) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&chain)
        {
            return Arc::clone(cached);
        }
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = cache.get(&chain) {
            return Arc::clone(cached);
        }
        debug!(?locales, ?chain, "building translation");
        let translation = Arc::new(self.build(&chain));
        cache.insert(chain, Arc::clone(&translation));
        translation
    }

    pub fn cached_translations(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Installed bundles for `locales`, most preferred first, ending in the fallback.
    fn resolve(&self, locales: &[String]) -> Vec<String> {
        let mut chain: Vec<String> = Vec::new();
        let candidates = locales
            .iter()
            .flat_map(|locale| locale_candidates(locale))
            .chain(std::iter::once(FALLBACK_LOCALE.to_string()));
        for candidate in candidates {
            if self.bundles.contains_key(&candidate) && !chain.contains(&candidate) {
                chain.push(candidate);
            }
        }
        chain
    }

    fn build(&self, chain: &[String]) -> Translation {
        let mut entries = HashMap::new();
        for locale in chain.iter().rev() {
            if let Some(bundle) = self.bundles.get(locale) {
                entries.extend(bundle.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        Translation {
            language: chain.first().cloned(),
            entries,
        }
    }
}

/// `de-DE` yields `de_DE` then `de`.
fn locale_candidates(locale: &str) -> Vec<String> {
    let normalized = locale.trim().replace('-', "_");
    let mut candidates = vec![normalized.clone()];
    if let Some((language, _)) = normalized.split_once('_') {
        candidates.push(language.to_string());
    }
    candidates
}

fn read_bundles(dir: &Path) -> Vec<(String, Bundle)> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut bundles = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("toml") {
            continue;
        }
        let Some(locale) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let parsed = fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|raw| toml::from_str::<Bundle>(&raw).map_err(|e| e.to_string()));
        match parsed {
            Ok(bundle) => bundles.push((locale.to_string(), bundle)),
            Err(error) => warn!(path = %path.display(), %error, "skipping translation bundle"),
        }
    }
    bundles
}

/// Locale tags from an `Accept-Language` header, highest quality first.
pub fn parse_accept_language(header: &str) -> Vec<String> {
    let mut weighted: Vec<(String, f32)> = header
        .split(',')
        .filter_map(|part| {
            let mut pieces = part.trim().split(';');
            let tag = pieces.next()?.trim();
            if tag.is_empty() || tag == "*" {
                return None;
            }
            let quality = pieces
                .find_map(|p| p.trim().strip_prefix("q="))
                .and_then(|q| q.parse::<f32>().ok())
                .unwrap_or(1.0);
            (quality > 0.0).then(|| (tag.to_string(), quality))
        })
        .collect();
    weighted.sort_by(|a, b| b.1.total_cmp(&a.1));
    weighted.into_iter().map(|(tag, _)| tag).collect()
}

#[cfg(test)]
#[path = "tests/l10n_tests.rs"]
mod tests;
