//! Per-bot settings backed by JSON files.
//!
//! Every bot reads its settings from its own JSON file, here is an example:
//!
//! ```json
//! {
//!   "token": "8888888888:XXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXX",
//!   "database": "./data/cats.sqlite",
//!   "subscribers": { "-1001234567890": { "hourly": true } },
//!   "animal": "cat",
//!   "description": "Hourly cats, delivered.",
//!   "channels": { "hourly": -1001111111111, "log": -1002222222222, "queue": 0 },
//!   "triggers": { "text": ["kitty"], "regex": ["^c+a+t+$"], "sticker": [] }
//! }
//! ```
//!
//! Keys missing from the file keep their defaults, see [`SettingsData`].
//! Keys this crate does not know about are kept and written back on
//! [`Settings::save`].
//!
//! [`ConfigRegistry`] hands out exactly one [`Settings`] per file path.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use paste::paste;
use parking_lot::{Mutex, ReentrantMutex};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Top-level keys starting with this prefix are internal and never saved.
pub const RESERVED_PREFIX: &str = "__";

const SETTINGS_EXTENSION: &str = ".json";

/// Permission level required to use a cataloged command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Privilege {
    User,
    Admin,
}

/// An entry of the bot command catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDescriptor {
    pub description: String,
    pub privilege: Privilege,
}

impl CommandDescriptor {
    pub fn new(description: &str, privilege: Privilege) -> Self {
        Self {
            description: description.to_owned(),
            privilege,
        }
    }
}

/// Numeric chat ids the bot posts to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Channels {
    pub hourly: i64,
    pub log: i64,
    pub queue: i64,
}

/// Message triggers, grouped by how they are matched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Triggers {
    pub text: Vec<String>,
    pub regex: Vec<String>,
    pub sticker: Vec<String>,
}

/// Credentials of the user-account client session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelethonKeys {
    pub session: String,
    pub api_id: i64,
    pub api_hash: String,
}

/// OAuth key pairs for the Twitter integration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwitterKeys {
    pub access_token_key: String,
    pub access_token_secret: String,
    pub consumer_key: String,
    pub consumer_secret: String,
}

/// Everything a settings file holds.
///
/// This is also the persistence schema: [`Settings::save`] writes exactly
/// these fields plus the unknown keys collected in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsData {
    /// The token of the Telegram bot.
    pub token: String,
    /// Locator of the bot's database.
    pub database: String,
    /// Chat id to subscription state.
    pub subscribers: BTreeMap<String, Value>,
    /// The animal tag the bot posts about.
    pub animal: String,
    pub description: String,
    pub channels: Channels,
    pub triggers: Triggers,
    /// Catalog of the commands the bot advertises.
    pub bot_commands: BTreeMap<String, CommandDescriptor>,
    pub telethon_keys: TelethonKeys,
    pub twitter_keys: TwitterKeys,
    /// Top-level keys not covered by the fields above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

macro_rules! define_defaults {
    ($ty_name:ident { $($name:ident: $ty:ty = $default:expr,)* }) => {
        define_defaults! { $($name: $ty = $default,)* }
        paste! {
            impl Default for $ty_name {
                fn default() -> Self {
                    Self {
                        $($name: [<default_ $name>](),)*
                    }
                }
            }
        }
    };
    ($($name:ident: $ty:ty = $default:expr,)*) => {
        paste! {
            $(
                fn [<default_ $name>]() -> $ty {
                    $default
                }
            )*
        }
    };
}

define_defaults!(SettingsData {
    token: String = String::new(),
    database: String = String::new(),
    subscribers: BTreeMap<String, Value> = BTreeMap::new(),
    animal: String = String::new(),
    description: String = String::new(),
    channels: Channels = Channels::default(),
    triggers: Triggers = Triggers::default(),
    bot_commands: BTreeMap<String, CommandDescriptor> = [
        ("!c", "Request n number !animal images.", Privilege::User),
        (
            "!c_info",
            "Detailed information regarding what the bot uses to run.",
            Privilege::User,
        ),
        (
            "subscribe",
            "Menu for choosing your chats subscription to !animal.",
            Privilege::Admin,
        ),
    ]
    .into_iter()
    .map(|(name, description, privilege)| {
        (name.to_owned(), CommandDescriptor::new(description, privilege))
    })
    .collect(),
    telethon_keys: TelethonKeys = TelethonKeys::default(),
    twitter_keys: TwitterKeys = TwitterKeys::default(),
    extra: Map<String, Value> = Map::new(),
});

/// Settings of one bot, bound to the JSON file they are loaded from.
///
/// All access goes through a re-entrant lock owned by this record, so
/// [`load`](Self::load) and [`save`](Self::save) can be nested on the same
/// thread.
#[derive(Debug)]
pub struct Settings {
    location: PathBuf,
    data: ReentrantMutex<RefCell<SettingsData>>,
}

impl Settings {
    fn open(location: PathBuf) -> Result<Self> {
        let settings = Self {
            location,
            data: ReentrantMutex::new(RefCell::new(SettingsData::default())),
        };
        settings.load()?;
        Ok(settings)
    }

    /// Path of the backing file.
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Short name of the bot, taken from the file stem.
    pub fn name(&self) -> String {
        self.location
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Re-reads the backing file. Every key present in the file replaces the
    /// field of the same name, other fields keep their current values.
    pub fn load(&self) -> Result<()> {
        let guard = self.data.lock();

        let reader = BufReader::new(File::open(&self.location)?);
        let from_file: Map<String, Value> = serde_json::from_reader(reader)?;

        let mut merged = match serde_json::to_value(&*guard.borrow())? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        merged.extend(from_file);
        let data: SettingsData = serde_json::from_value(Value::Object(merged))?;
        *guard.borrow_mut() = data;

        debug!("Settings loaded from {}", self.location.display());
        Ok(())
    }

    /// Overwrites the backing file with the current settings.
    ///
    /// The file is truncated and rewritten in place, a crash halfway through
    /// leaves it corrupted.
    pub fn save(&self) -> Result<()> {
        let guard = self.data.lock();

        let mut map = match serde_json::to_value(&*guard.borrow())? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        map.retain(|key, _| !key.starts_with(RESERVED_PREFIX));

        let mut writer = BufWriter::new(File::create(&self.location)?);
        serde_json::to_writer_pretty(&mut writer, &map)?;
        writer.flush()?;

        debug!("Settings saved to {}", self.location.display());
        Ok(())
    }

    /// Runs `f` with shared access to the settings.
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&SettingsData) -> R,
    {
        let guard = self.data.lock();
        let data = guard.borrow();
        f(&data)
    }

    /// Runs `f` with exclusive access to the settings.
    ///
    /// `f` must not call back into [`load`](Self::load), [`save`](Self::save)
    /// or [`read`](Self::read) on the same record.
    pub fn update<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut SettingsData) -> R,
    {
        let guard = self.data.lock();
        let mut data = guard.borrow_mut();
        f(&mut data)
    }

    pub fn snapshot(&self) -> SettingsData {
        self.read(Clone::clone)
    }

    pub fn token(&self) -> String {
        self.read(|data| data.token.clone())
    }
}

/// Hands out one [`Settings`] per settings file path.
///
/// Paths are keyed as given, `conf/a.json` and `./conf/a.json` are
/// different entries.
#[derive(Debug, Default)]
pub struct ConfigRegistry {
    entries: Mutex<HashMap<PathBuf, Arc<Settings>>>,
}

impl ConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the settings for `path`, loading them on first use.
    ///
    /// Fails with [`Error::InvalidPath`] if `path` does not end with `.json`
    /// and with [`Error::NotFound`] if the file does not exist. Both checks
    /// run on every call.
    pub fn get_or_create<P>(&self, path: P) -> Result<Arc<Settings>>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        if !path.to_string_lossy().ends_with(SETTINGS_EXTENSION) {
            return Err(Error::InvalidPath(path.to_owned()));
        }
        if !path.exists() {
            return Err(Error::NotFound(path.to_owned()));
        }

        let mut entries = self.entries.lock();
        if let Some(settings) = entries.get(path) {
            return Ok(Arc::clone(settings));
        }

        let settings = Arc::new(Settings::open(path.to_owned())?);
        entries.insert(path.to_owned(), Arc::clone(&settings));
        info!("Settings for \"{}\" are loaded", settings.name());
        Ok(settings)
    }

    pub fn get<P>(&self, path: P) -> Option<Arc<Settings>>
    where
        P: AsRef<Path>,
    {
        self.entries.lock().get(path.as_ref()).cloned()
    }

    pub fn all(&self) -> Vec<Arc<Settings>> {
        self.entries.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
