//! Trading calendars and the exchange-tag alias registry.
//!
//! The registry is built once by the process bootstrap and passed around
//! explicitly. Ingested equities carry a synthetic exchange tag (`CSVDIR`),
//! which resolves through an alias to a real calendar.

use crate::error::BundleError;
use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Name of the calendar the default aliases point at.
pub const DEFAULT_CALENDAR: &str = "NYSE";

/// An ordered set of trading sessions.
pub trait TradingCalendar: Send + Sync {
    fn name(&self) -> &str;

    fn is_session(&self, date: NaiveDate) -> bool;

    /// All sessions in `[start, end]`, ascending. Empty when `start > end`.
    fn sessions_in_range(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| self.is_session(*d))
            .collect()
    }
}

/// Monday through Friday, no holiday list.
#[derive(Debug, Clone)]
pub struct WeekdayCalendar {
    name: String,
}

impl WeekdayCalendar {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl TradingCalendar for WeekdayCalendar {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_session(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }
}

/// The alias table every ingest run registers unless configured otherwise.
pub fn default_aliases() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("CSVDIR".to_string(), DEFAULT_CALENDAR.to_string()),
        ("CUSTOM".to_string(), DEFAULT_CALENDAR.to_string()),
    ])
}

/// Calendars by canonical name plus aliases onto them.
#[derive(Default, Clone)]
pub struct CalendarRegistry {
    calendars: BTreeMap<String, Arc<dyn TradingCalendar>>,
    aliases: BTreeMap<String, String>,
}

impl CalendarRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in calendars and the given alias table.
    pub fn bootstrap(aliases: &BTreeMap<String, String>) -> Result<Self, BundleError> {
        let mut registry = Self::new();
        registry.register_calendar(Arc::new(WeekdayCalendar::new(DEFAULT_CALENDAR)))?;
        for (alias, target) in aliases {
            registry.register_alias(alias, target)?;
        }
        Ok(registry)
    }

    pub fn register_calendar(&mut self, calendar: Arc<dyn TradingCalendar>) -> Result<(), BundleError> {
        let name = calendar.name().to_string();
        if self.calendars.contains_key(&name) || self.aliases.contains_key(&name) {
            return Err(BundleError::config(format!(
                "calendar '{name}' is already registered"
            )));
        }
        self.calendars.insert(name, calendar);
        Ok(())
    }

    /// Point `alias` at `target`. Chains collapse onto the real calendar.
    ///
    /// Re-registering an alias onto the same calendar is a no-op; pointing it
    /// somewhere else is an error.
    pub fn register_alias(&mut self, alias: &str, target: &str) -> Result<(), BundleError> {
        if self.calendars.contains_key(alias) {
            return Err(BundleError::config(format!(
                "alias '{alias}' would shadow a registered calendar"
            )));
        }
        let canonical = self.canonical_name(target).to_string();
        if !self.calendars.contains_key(&canonical) {
            return Err(BundleError::config(format!(
                "alias '{alias}' points at unknown calendar '{target}'"
            )));
        }
        match self.aliases.get(alias) {
            Some(existing) if *existing == canonical => Ok(()),
            Some(existing) => Err(BundleError::config(format!(
                "alias '{alias}' already resolves to '{existing}'"
            ))),
            None => {
                self.aliases.insert(alias.to_string(), canonical);
                Ok(())
            }
        }
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn TradingCalendar>, BundleError> {
        self.calendars
            .get(self.canonical_name(name))
            .cloned()
            .ok_or_else(|| BundleError::config(format!("no calendar registered for '{name}'")))
    }

    pub fn aliases(&self) -> &BTreeMap<String, String> {
        &self.aliases
    }

    fn canonical_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }
}
