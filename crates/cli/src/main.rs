//! # CLI — LodeKV interactive shell
//!
//! A REPL-style command-line interface for the LodeKV storage engine. Reads
//! commands from stdin, executes them against the engine, and prints results
//! to stdout. Designed for both interactive use and scripted testing (pipe
//! commands via stdin).
//!
//! ## Commands
//!
//! ```text
//! PUT key value      Insert or update a key-value pair
//! GET key            Look up a key (prints value or "(nil)")
//! DEL key            Delete a key (writes a tombstone)
//! KEYS [prefix]      List live keys, optionally filtered by prefix
//! MERGE              Compact dead records and write a hint file
//! STAT               Print key/file counts and sizes
//! SYNC               Fsync every active data file
//! EXIT / QUIT        Shut down gracefully
//! ```
//!
//! ## Configuration
//!
//! All settings are controlled via environment variables:
//!
//! ```text
//! LODE_DIR           database directory        (default: "./lodekv-data")
//! LODE_FILE_SIZE_KB  segment size in KiB       (default: 262144 = 256 MiB)
//! LODE_SYNC          fsync every append        (default: "false")
//! LODE_SLOTS         shard count               (default: 4)
//! LODE_INDEX         btree | art | bptree      (default: "art")
//! LODE_MERGE_RATIO   reclaim/total gate        (default: 0.5)
//! ```

use std::io::{self, BufRead, Write};

use anyhow::Result;
use engine::{Engine, IndexType, IteratorOptions, KvError, Options};

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn options_from_env() -> Options {
    let index_type = match env_or("LODE_INDEX", "art").to_lowercase().as_str() {
        "btree" => IndexType::BTree,
        "bptree" => IndexType::BPlusTree,
        _ => IndexType::Art,
    };
    let file_size_kb: u32 = env_or("LODE_FILE_SIZE_KB", "262144")
        .parse()
        .unwrap_or(262_144);
    Options {
        dir_path: env_or("LODE_DIR", "./lodekv-data").into(),
        data_file_size: file_size_kb.saturating_mul(1024),
        sync_writes: env_or("LODE_SYNC", "false").parse().unwrap_or(false),
        bytes_per_sync: 0,
        index_type,
        mmap_at_startup: true,
        data_file_merge_ratio: env_or("LODE_MERGE_RATIO", "0.5").parse().unwrap_or(0.5),
        slots: env_or("LODE_SLOTS", "4").parse().unwrap_or(4),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let options = options_from_env();
    let dir = options.dir_path.clone();
    let engine = Engine::open(options)?;

    println!(
        "LodeKV started (dir={}, seq={})",
        dir.display(),
        engine.seq_no()
    );
    println!("Commands: PUT key value | GET key | DEL key | KEYS [prefix]");
    println!("          MERGE | STAT | SYNC | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "PUT" | "SET" => {
                    if let Some(key) = parts.next() {
                        let value: String = parts.collect::<Vec<&str>>().join(" ");
                        if value.is_empty() {
                            println!("ERR usage: PUT key value");
                        } else {
                            match engine.put(key.as_bytes(), value.as_bytes()) {
                                Ok(()) => println!("OK"),
                                Err(e) => println!("ERR put failed: {}", e),
                            }
                        }
                    } else {
                        println!("ERR usage: PUT key value");
                    }
                }
                "GET" => {
                    if let Some(key) = parts.next() {
                        match engine.get(key.as_bytes()) {
                            Ok(value) => println!("{}", String::from_utf8_lossy(&value)),
                            Err(KvError::KeyNotFound) => println!("(nil)"),
                            Err(e) => println!("ERR read failed: {}", e),
                        }
                    } else {
                        println!("ERR usage: GET key");
                    }
                }
                "DEL" => {
                    if let Some(key) = parts.next() {
                        match engine.delete(key.as_bytes()) {
                            Ok(()) => println!("OK"),
                            Err(e) => println!("ERR delete failed: {}", e),
                        }
                    } else {
                        println!("ERR usage: DEL key");
                    }
                }
                "KEYS" => {
                    let prefix = parts.next().unwrap_or("").as_bytes().to_vec();
                    match engine.iterator(IteratorOptions {
                        prefix,
                        reverse: false,
                    }) {
                        Ok(mut it) => {
                            let mut count = 0usize;
                            while it.valid() {
                                println!("{}", String::from_utf8_lossy(it.key()));
                                count += 1;
                                it.next();
                            }
                            println!("({} keys)", count);
                        }
                        Err(e) => println!("ERR keys failed: {}", e),
                    }
                }
                "MERGE" => match engine.merge() {
                    Ok(()) => println!("OK"),
                    Err(e) => println!("ERR merge failed: {}", e),
                },
                "STAT" => match engine.stat() {
                    Ok(stat) => println!(
                        "keys={} data_files={} reclaimable={}B disk={}B",
                        stat.key_num, stat.data_file_num, stat.reclaimable_size, stat.disk_size
                    ),
                    Err(e) => println!("ERR stat failed: {}", e),
                },
                "SYNC" => match engine.sync_all() {
                    Ok(()) => println!("OK"),
                    Err(e) => println!("ERR sync failed: {}", e),
                },
                "EXIT" | "QUIT" => {
                    engine.close()?;
                    println!("bye");
                    return Ok(());
                }
                other => println!("ERR unknown command: {}", other),
            }
        }
        print!("> ");
        io::stdout().flush().ok();
    }

    engine.close()?;
    Ok(())
}
