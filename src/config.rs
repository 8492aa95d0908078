//! Typed environment-input parameters (spec §6, C9). The original reads
//! these from a `databases.txt`-adjacent parameter file; this crate only
//! specifies the typed shape, parsed from whatever key=value source the
//! host process provides, with every default chosen to match the values
//! spec §6 and `original_source`'s `system_parameter.c` document.

use std::{collections::HashMap, time::Duration};

/// All environment inputs this crate's core consumes (spec §6's list).
#[derive(Debug, Clone)]
pub struct Config {
    pub temp_mem_buffer_size: usize,
    pub index_scan_key_buffer_size: usize,
    pub bosr_maxtmp_size: usize,
    pub db_volume_size: u64,
    pub session_state_timeout: Duration,
    pub log_checkpoint_interval: Duration,
    pub page_bg_flush_interval: Duration,
    pub log_async_log_flush_interval: Duration,
    pub remove_log_archives_interval: Duration,
    pub ha_delay_limit: Duration,
    pub suppress_fsync: bool,
    pub thread_stacksize: usize,
    pub log_trace_flush_time: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            temp_mem_buffer_size: 32 * 1024,
            index_scan_key_buffer_size: 2 * 1024 * 1024,
            bosr_maxtmp_size: 100 * 1024 * 1024,
            db_volume_size: 512 * 1024 * 1024,
            session_state_timeout: Duration::from_secs(60 * 60),
            log_checkpoint_interval: Duration::from_secs(10 * 60),
            page_bg_flush_interval: Duration::from_millis(1_000),
            log_async_log_flush_interval: Duration::from_millis(200),
            remove_log_archives_interval: Duration::from_secs(24 * 60 * 60),
            ha_delay_limit: Duration::from_secs(0),
            suppress_fsync: false,
            thread_stacksize: 1024 * 1024,
            log_trace_flush_time: Duration::from_millis(1_000),
        }
    }
}

impl Config {
    /// Build a config from a flat key=value map (e.g. the parsed
    /// contents of a parameter file), falling back to defaults for any
    /// key left unset. Unrecognized keys are ignored; malformed values
    /// for a recognized key are ignored too (the default wins), since a
    /// boot-time parameter file typo should not be fatal.
    pub fn from_map(values: &HashMap<String, String>) -> Self {
        let mut config = Config::default();

        macro_rules! set_usize {
            ($key:literal, $field:ident) => {
                if let Some(v) = values.get($key).and_then(|v| v.parse::<usize>().ok()) {
                    config.$field = v;
                }
            };
        }
        macro_rules! set_u64 {
            ($key:literal, $field:ident) => {
                if let Some(v) = values.get($key).and_then(|v| v.parse::<u64>().ok()) {
                    config.$field = v;
                }
            };
        }
        macro_rules! set_secs {
            ($key:literal, $field:ident) => {
                if let Some(v) = values.get($key).and_then(|v| v.parse::<u64>().ok()) {
                    config.$field = Duration::from_secs(v);
                }
            };
        }
        macro_rules! set_millis {
            ($key:literal, $field:ident) => {
                if let Some(v) = values.get($key).and_then(|v| v.parse::<u64>().ok()) {
                    config.$field = Duration::from_millis(v);
                }
            };
        }
        macro_rules! set_bool {
            ($key:literal, $field:ident) => {
                if let Some(v) = values.get($key).and_then(|v| v.parse::<bool>().ok()) {
                    config.$field = v;
                }
            };
        }

        set_usize!("TEMP_MEM_BUFFER_SIZE", temp_mem_buffer_size);
        set_usize!("INDEX_SCAN_KEY_BUFFER_SIZE", index_scan_key_buffer_size);
        set_usize!("BOSR_MAXTMP_SIZE", bosr_maxtmp_size);
        set_u64!("DB_VOLUME_SIZE", db_volume_size);
        set_secs!("SESSION_STATE_TIMEOUT", session_state_timeout);
        set_secs!("LOG_CHECKPOINT_INTERVAL", log_checkpoint_interval);
        set_millis!("PAGE_BG_FLUSH_INTERVAL", page_bg_flush_interval);
        set_millis!("LOG_ASYNC_LOG_FLUSH_INTERVAL", log_async_log_flush_interval);
        set_secs!("REMOVE_LOG_ARCHIVES_INTERVAL", remove_log_archives_interval);
        set_secs!("HA_DELAY_LIMIT", ha_delay_limit);
        set_bool!("SUPPRESS_FSYNC", suppress_fsync);
        set_usize!("THREAD_STACKSIZE", thread_stacksize);
        set_millis!("LOG_TRACE_FLUSH_TIME", log_trace_flush_time);

        config
    }
}
