use std::collections::HashMap;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use vpd_manager::backup_restore::{self, UserChoice, UserChoicePrompt};
use vpd_manager::config::Config;
use vpd_manager::facade::KeywordManager;
use vpd_manager::inventory_bus::NoopInventoryBus;
use vpd_manager::reboot_guard::NullGuard;


#[derive(Parser)]
enum ProgMode {
    /// Read a single keyword out of a configured FRU's VPD.
    Read(ReadArgs),
    /// Write a single keyword into a configured FRU's VPD.
    Write(WriteArgs),
    /// Parse a raw EEPROM image and print its record/keyword structure.
    Dump(DumpArgs),
    /// Compare a FRU's backup-mirrored keywords against their source.
    Compare(ReconcileArgs),
    /// Copy every mismatched backup-mirrored keyword from source to destination.
    Restore(ReconcileArgs),
    /// Reset every keyword flagged for manufacturing reset to its default value.
    ManufacturingReset(ReconcileArgs),
}

#[derive(Parser)]
struct ReadArgs {
    pub config: PathBuf,
    pub vpd_path: String,
    pub record: String,
    pub keyword: String,
}

#[derive(Parser)]
struct WriteArgs {
    pub config: PathBuf,
    pub vpd_path: String,
    pub record: String,
    pub keyword: String,
    pub value: String,
}

#[derive(Parser)]
struct DumpArgs {
    pub input_file: PathBuf,
    #[arg(long, default_value_t = 0)]
    pub offset: u64,
}

#[derive(Parser)]
struct ReconcileArgs {
    pub config: PathBuf,
    pub vpd_path: String,
}

/// Resolves the configured FRUs into a [`KeywordManager`] backed by a
/// [`NullGuard`] and [`NoopInventoryBus`] — this core has no opinion on how a
/// surrounding service implements reboot coordination or inventory caching,
/// so the CLI wires up the inert defaults.
fn load_manager(config_path: &PathBuf) -> KeywordManager<'static> {
    let config = Config::load(config_path)
        .expect("failed to load configuration");
    let frus: HashMap<_, _> = config.frus.into_iter().collect();
    KeywordManager::new(frus, Box::new(NullGuard), &NoopInventoryBus)
}

struct StdinPrompt;
impl UserChoicePrompt for StdinPrompt {
    fn choose(&self, entry: &backup_restore::Entry, comparison: &backup_restore::Comparison) -> (UserChoice, Option<Vec<u8>>) {
        println!(
            "{}/{} <-> {}/{}: {:?}",
            entry.source_record, entry.source_keyword,
            entry.destination_record, entry.destination_keyword,
            comparison,
        );
        println!("[s]ource, [d]estination, [e]nter new value, [k]skip?");
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)
            .expect("failed to read from stdin");
        match line.trim() {
            "s" => (UserChoice::UseSource, None),
            "d" => (UserChoice::UseDestination, None),
            "e" => {
                println!("new value:");
                let mut value = String::new();
                std::io::stdin().read_line(&mut value)
                    .expect("failed to read from stdin");
                (UserChoice::EnterNewValue, Some(value.trim().as_bytes().to_vec()))
            },
            _ => (UserChoice::Skip, None),
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mode = ProgMode::parse();
    match mode {
        ProgMode::Read(args) => {
            let manager = load_manager(&args.config);
            let value = manager.read_keyword(&args.vpd_path, &args.record, &args.keyword)
                .expect("failed to read keyword");
            println!("{}", String::from_utf8_lossy(&value));
        },
        ProgMode::Write(args) => {
            let manager = load_manager(&args.config);
            let written = manager.update_keyword(&args.vpd_path, &args.record, &args.keyword, args.value.as_bytes())
                .expect("failed to write keyword");
            println!("wrote {written} bytes");
        },
        ProgMode::Dump(args) => {
            let mut buf = vpd_manager::eeprom::read_blob(&args.input_file, args.offset)
                .expect("failed to read EEPROM image");
            let content = vpd_format::parse(&mut buf)
                .expect("failed to parse VPD content");
            match content {
                vpd_format::VpdContent::Ipz { store, .. } => {
                    for record in store.records() {
                        println!("{record}:");
                        for keyword in store.keywords(&record) {
                            let value = store.get(&record, keyword).unwrap_or(&[]);
                            println!("  {keyword} = {:?}", String::from_utf8_lossy(value));
                        }
                    }
                },
                vpd_format::VpdContent::Keyword(kw) => {
                    println!("{:#?}", kw);
                },
            }
        },
        ProgMode::Compare(args) => {
            let config = Config::load(&args.config)
                .expect("failed to load configuration");
            let entries = vpd_manager::config::load_backup_restore_entries(&config.backup_restore_config_path)
                .expect("failed to load backup/restore mapping");
            let fru = config.frus.get(&args.vpd_path)
                .expect("vpd_path does not resolve to a configured FRU");
            let mut buf = vpd_manager::eeprom::read_blob(args.vpd_path.as_ref(), fru.offset)
                .expect("failed to read EEPROM image");
            let parsed = vpd_format::ipz::parse(&mut buf)
                .expect("failed to parse VPD content");
            let store = vpd_format::Store::from_parsed(parsed);
            print!("{}", backup_restore::render_mismatches(&store, &entries));
        },
        ProgMode::Restore(args) => {
            let config = Config::load(&args.config)
                .expect("failed to load configuration");
            let entries = vpd_manager::config::load_backup_restore_entries(&config.backup_restore_config_path)
                .expect("failed to load backup/restore mapping");
            let fru = config.frus.get(&args.vpd_path)
                .expect("vpd_path does not resolve to a configured FRU");
            let mut buf = vpd_manager::eeprom::read_blob(args.vpd_path.as_ref(), fru.offset)
                .expect("failed to read EEPROM image");
            let parsed = vpd_format::ipz::parse(&mut buf)
                .expect("failed to parse VPD content");
            let store = vpd_format::Store::from_parsed(parsed);
            let bus = NoopInventoryBus;
            let coordinator = vpd_manager::redundancy::RedundancyCoordinator {
                primary: vpd_manager::redundancy::EepromTarget { path: args.vpd_path.clone().into(), offset: fru.offset },
                redundant: fru.redundant_eeprom.clone().map(|path| vpd_manager::redundancy::EepromTarget { path, offset: fru.offset }),
                inventory_path: fru.inventory_path.clone(),
                bus: &bus,
            };
            let results = backup_restore::interactive_fix(&coordinator, &store, &entries, &StdinPrompt);
            for (entry, outcome) in results {
                match outcome {
                    Ok(()) => println!("{}/{}: resolved", entry.source_record, entry.source_keyword),
                    Err(e) => println!("{}/{}: failed: {e}", entry.source_record, entry.source_keyword),
                }
            }
        },
        ProgMode::ManufacturingReset(args) => {
            let config = Config::load(&args.config)
                .expect("failed to load configuration");
            let entries = vpd_manager::config::load_backup_restore_entries(&config.backup_restore_config_path)
                .expect("failed to load backup/restore mapping");
            let fru = config.frus.get(&args.vpd_path)
                .expect("vpd_path does not resolve to a configured FRU");
            let bus = NoopInventoryBus;
            let coordinator = vpd_manager::redundancy::RedundancyCoordinator {
                primary: vpd_manager::redundancy::EepromTarget { path: args.vpd_path.clone().into(), offset: fru.offset },
                redundant: fru.redundant_eeprom.clone().map(|path| vpd_manager::redundancy::EepromTarget { path, offset: fru.offset }),
                inventory_path: fru.inventory_path.clone(),
                bus: &bus,
            };
            let results = backup_restore::manufacturing_reset(&coordinator, &entries);
            for (entry, outcome) in results {
                match outcome {
                    Ok(()) => println!("{}/{}: reset", entry.source_record, entry.source_keyword),
                    Err(e) => println!("{}/{}: failed: {e}", entry.source_record, entry.source_keyword),
                }
            }
        },
    }
}
