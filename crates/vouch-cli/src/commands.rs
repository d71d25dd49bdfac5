use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, ensure, Context};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use vouch_crypto::{Batch, ContentHasher, InclusionReceipt, ProofVerifier};
use vouch_ledger::{
    anchor_batch, verify_anchored, AnchorVerdict, AuditTrailReconstructor, EntityHistory,
    InMemoryLedger, ReconstructorConfig,
};
use vouch_store::{ContentStore, InMemoryContentStore};
use vouch_types::{Address, ChainHash, Digest, EntityId};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Hash(args) => cmd_hash(args, format),
        Command::Batch(args) => cmd_batch(args, format),
        Command::Verify(args) => cmd_verify(args, format),
        Command::Simulate(args) => cmd_simulate(args, config, format).await,
        Command::Config => cmd_config(&config, format),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ReconstructorConfig> {
    match path {
        Some(path) => {
            let config = ReconstructorConfig::from_file(path)?;
            debug!(path = %path.display(), "loaded configuration");
            Ok(config)
        }
        None => Ok(ReconstructorConfig::default()),
    }
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn format_timestamp(secs: Option<u64>) -> String {
    secs.and_then(|s| i64::try_from(s).ok())
        .and_then(|s| DateTime::<Utc>::from_timestamp(s, 0))
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "unknown time".into())
}

// ---------------------------------------------------------------------------
// hash
// ---------------------------------------------------------------------------

fn cmd_hash(args: HashArgs, format: OutputFormat) -> anyhow::Result<()> {
    let credential = read_json(&args.credential)?;
    let digest = ContentHasher::hash_json(&credential)?;
    match format {
        OutputFormat::Json => print_json(&json!({
            "credential": args.credential,
            "digest": digest,
        })),
        OutputFormat::Text => {
            println!("{}  {}", digest.to_string().yellow(), args.credential.display());
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// batch
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchManifest {
    pub batch_id: String,
    pub root: Digest,
    pub leaf_count: usize,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<ManifestEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub credential: PathBuf,
    pub leaf: Digest,
    pub receipt: PathBuf,
}

/// Hash and store each credential, build the batch, and write the receipts
/// plus a `batch.json` manifest into `args.out`.
pub fn write_batch(args: &BatchArgs) -> anyhow::Result<BatchManifest> {
    let store = InMemoryContentStore::new();
    let mut leaves = Vec::with_capacity(args.credentials.len());
    for path in &args.credentials {
        let credential = read_json(path)?;
        leaves.push(store.put_json(&credential)?);
    }

    let batch_id = args
        .id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::now_v7().to_string());
    let batch = Batch::build(batch_id, leaves)?;

    fs::create_dir_all(&args.out)
        .with_context(|| format!("creating {}", args.out.display()))?;

    let mut entries = Vec::with_capacity(batch.len());
    for (index, (path, receipt)) in args.credentials.iter().zip(batch.receipts()).enumerate() {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "credential".into());
        let receipt_path = args.out.join(format!("{index:03}-{stem}.receipt.json"));
        fs::write(&receipt_path, serde_json::to_vec_pretty(&receipt)?)
            .with_context(|| format!("writing {}", receipt_path.display()))?;
        entries.push(ManifestEntry {
            credential: path.clone(),
            leaf: *receipt.leaf(),
            receipt: receipt_path,
        });
    }

    let manifest = BatchManifest {
        batch_id: batch.batch_id().to_string(),
        root: batch.root(),
        leaf_count: batch.len(),
        created_at: Utc::now(),
        entries,
    };
    let manifest_path = args.out.join("batch.json");
    fs::write(&manifest_path, serde_json::to_vec_pretty(&manifest)?)
        .with_context(|| format!("writing {}", manifest_path.display()))?;
    info!(batch_id = %manifest.batch_id, root = %manifest.root, leaves = manifest.leaf_count, "batch written");
    Ok(manifest)
}

fn cmd_batch(args: BatchArgs, format: OutputFormat) -> anyhow::Result<()> {
    let manifest = write_batch(&args)?;
    match format {
        OutputFormat::Json => print_json(&manifest),
        OutputFormat::Text => {
            println!(
                "{} Batch {} ({} credentials)",
                "✓".green().bold(),
                manifest.batch_id.bold(),
                manifest.leaf_count
            );
            println!("  Root: {}", manifest.root.to_string().yellow());
            for entry in &manifest.entries {
                println!(
                    "  {}  {} -> {}",
                    entry.leaf.short_hex().dimmed(),
                    entry.credential.display(),
                    entry.receipt.display()
                );
            }
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// verify
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOutcome {
    pub batch_id: String,
    pub leaf: Digest,
    pub root: Digest,
    pub computed_root: Digest,
    /// `None` when no credential file was supplied.
    pub credential_matches: Option<bool>,
    pub verified: bool,
}

pub fn verify_receipt(args: &VerifyArgs) -> anyhow::Result<VerifyOutcome> {
    let receipt: InclusionReceipt = serde_json::from_value(read_json(&args.receipt)?)
        .with_context(|| format!("{} is not an inclusion receipt", args.receipt.display()))?;
    let root = match &args.root {
        Some(root) => root
            .parse::<Digest>()
            .map_err(|e| anyhow!("invalid root {root}: {e}"))?,
        None => receipt.root,
    };
    let credential_leaf = match &args.credential {
        Some(path) => Some(ContentHasher::hash_json(&read_json(path)?)?),
        None => None,
    };
    let leaf = credential_leaf.unwrap_or(*receipt.leaf());
    let computed_root = ProofVerifier::compute_root(&leaf, &receipt.proof);
    let credential_matches = credential_leaf.map(|l| l == *receipt.leaf());

    Ok(VerifyOutcome {
        batch_id: receipt.batch_id,
        leaf,
        root,
        verified: computed_root == root && credential_matches != Some(false),
        computed_root,
        credential_matches,
    })
}

fn cmd_verify(args: VerifyArgs, format: OutputFormat) -> anyhow::Result<()> {
    let outcome = verify_receipt(&args)?;
    match format {
        OutputFormat::Json => print_json(&outcome)?,
        OutputFormat::Text => {
            if outcome.verified {
                println!("{} Receipt verified", "✓".green().bold());
            } else {
                println!("{} Receipt does not verify", "✗".red().bold());
            }
            println!("  Batch: {}", outcome.batch_id.bold());
            println!("  Leaf: {}", outcome.leaf.to_string().yellow());
            println!("  Root: {}", outcome.root);
            if outcome.computed_root != outcome.root {
                println!("  Computed: {}", outcome.computed_root.to_string().red());
            }
            match outcome.credential_matches {
                Some(true) => println!("  Credential: {}", "matches leaf".green()),
                Some(false) => println!("  Credential: {}", "does not match leaf".red()),
                None => {}
            }
        }
    }
    if outcome.credential_matches == Some(false) {
        bail!("credential does not match the receipt's leaf");
    }
    ensure!(outcome.verified, "proof does not match the committed root");
    Ok(())
}

// ---------------------------------------------------------------------------
// simulate
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    pub batch_id: String,
    pub root: Digest,
    pub anchor_tx: ChainHash,
    pub entities: Vec<SimulatedEntity>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatedEntity {
    pub entity_id: EntityId,
    pub anchor: AnchorVerdict,
    pub history: EntityHistory,
}

fn holder(index: usize) -> Address {
    Address::new([u8::try_from(index % 255 + 1).unwrap_or(u8::MAX); 20])
}

/// Issue `count` credentials on a fresh simulated ledger, transfer the first,
/// revoke the last, and reconstruct every history.
pub async fn simulate(count: usize, config: ReconstructorConfig) -> anyhow::Result<SimulationReport> {
    ensure!(count > 0, "a simulation needs at least one credential");

    let ledger = Arc::new(InMemoryLedger::new());
    let store: Arc<InMemoryContentStore> = Arc::new(InMemoryContentStore::new());

    let mut leaves = Vec::with_capacity(count);
    for index in 0..count {
        let credential = json!({
            "id": index + 1,
            "name": format!("student{}", index + 1),
            "degree": "Blockchain 101",
            "year": 2024,
        });
        leaves.push(store.put_json(&credential)?);
    }
    let batch = Batch::build(uuid::Uuid::now_v7().to_string(), leaves)?;
    let anchor_tx = anchor_batch(ledger.as_ref(), &batch, "simulation").await?;

    let mut entity_ids = Vec::with_capacity(count);
    for leaf in batch.leaves() {
        let (entity_id, _) = ledger.issue(*leaf);
        entity_ids.push(entity_id);
    }
    if let Some(first) = entity_ids.first() {
        ledger.transfer(*first, holder(0), holder(1));
    }
    if let Some(last) = entity_ids.last() {
        ledger.revoke(*last);
    }

    let reconstructor =
        AuditTrailReconstructor::new(Arc::clone(&ledger), config.clone()).with_store(store);
    let mut entities = Vec::with_capacity(count);
    for (entity_id, receipt) in entity_ids.into_iter().zip(batch.receipts()) {
        let history = reconstructor.history(entity_id).await?;
        let anchor = verify_anchored(ledger.as_ref(), &receipt, &config.retry).await?;
        entities.push(SimulatedEntity {
            entity_id,
            anchor,
            history,
        });
    }

    Ok(SimulationReport {
        batch_id: batch.batch_id().to_string(),
        root: batch.root(),
        anchor_tx,
        entities,
    })
}

async fn cmd_simulate(
    args: SimulateArgs,
    config: ReconstructorConfig,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let report = simulate(args.count, config).await?;
    if format == OutputFormat::Json {
        return print_json(&report);
    }

    println!(
        "{} Anchored batch {} in {}",
        "✓".green().bold(),
        report.batch_id.bold(),
        report.anchor_tx.short_hex().yellow()
    );
    println!("  Root: {}", report.root.to_string().yellow());
    for entity in &report.entities {
        let history = &entity.history;
        let anchor = if entity.anchor.is_verified() {
            "anchored".green()
        } else {
            "not anchored".red()
        };
        println!();
        println!(
            "{} {}  state: {}  proof: {}",
            "Entity".bold(),
            format!("#{}", history.entity_id).yellow().bold(),
            format!("{:?}", history.state).cyan(),
            anchor
        );
        if let Some(owner) = history.owner {
            println!("  Owner: {owner}");
        }
        for event in &history.events {
            println!(
                "  {:>6}  {}  {:<12} {}",
                format!("#{}", event.block_number).dimmed(),
                format_timestamp(event.timestamp),
                event.kind.to_string().green(),
                event.tx_hash.short_hex().dimmed()
            );
        }
        for anomaly in &history.anomalies {
            println!("  {} {:?} at block {}", "!".red().bold(), anomaly.kind, anomaly.block_number);
        }
        for degraded in &history.degraded {
            println!("  {} {:?}", "~".yellow(), degraded);
        }
        if history.possible_reorg {
            println!("  {}", "possible reorg".red().bold());
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config(config: &ReconstructorConfig, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(config),
        OutputFormat::Text => {
            print!("{}", toml::to_string_pretty(config)?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vouch_ledger::{AnomalyKind, LifecycleState};

    fn write_credential(dir: &Path, name: &str, value: Value) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();
        path
    }

    fn sample_batch(dir: &Path) -> (Vec<PathBuf>, BatchManifest) {
        let credentials = vec![
            write_credential(dir, "alice.json", json!({"name": "alice", "degree": "BSc"})),
            write_credential(dir, "bob.json", json!({"name": "bob", "degree": "MSc"})),
            write_credential(dir, "carol.json", json!({"name": "carol", "degree": "PhD"})),
        ];
        let args = BatchArgs {
            credentials: credentials.clone(),
            id: Some("spring".into()),
            out: dir.join("receipts"),
        };
        let manifest = write_batch(&args).unwrap();
        (credentials, manifest)
    }

    #[test]
    fn batch_writes_receipts_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let (_, manifest) = sample_batch(dir.path());

        assert_eq!(manifest.batch_id, "spring");
        assert_eq!(manifest.leaf_count, 3);
        assert!(dir.path().join("receipts/batch.json").exists());
        for entry in &manifest.entries {
            let receipt: InclusionReceipt =
                serde_json::from_slice(&fs::read(&entry.receipt).unwrap()).unwrap();
            assert_eq!(receipt.root, manifest.root);
            assert_eq!(*receipt.leaf(), entry.leaf);
            assert!(receipt.verify());
        }
    }

    #[test]
    fn batch_leaf_is_canonical_credential_digest() {
        let dir = tempfile::tempdir().unwrap();
        let (_, manifest) = sample_batch(dir.path());
        let reordered = json!({"degree": "BSc", "name": "alice"});
        assert_eq!(
            manifest.entries[0].leaf,
            ContentHasher::hash_json(&reordered).unwrap()
        );
    }

    #[test]
    fn verify_accepts_matching_credential() {
        let dir = tempfile::tempdir().unwrap();
        let (credentials, manifest) = sample_batch(dir.path());
        let outcome = verify_receipt(&VerifyArgs {
            receipt: manifest.entries[1].receipt.clone(),
            root: Some(manifest.root.to_string()),
            credential: Some(credentials[1].clone()),
        })
        .unwrap();
        assert!(outcome.verified);
        assert_eq!(outcome.credential_matches, Some(true));
    }

    #[test]
    fn verify_rejects_other_credential() {
        let dir = tempfile::tempdir().unwrap();
        let (credentials, manifest) = sample_batch(dir.path());
        let outcome = verify_receipt(&VerifyArgs {
            receipt: manifest.entries[1].receipt.clone(),
            root: None,
            credential: Some(credentials[0].clone()),
        })
        .unwrap();
        assert!(!outcome.verified);
        assert_eq!(outcome.credential_matches, Some(false));
    }

    #[test]
    fn verify_rejects_wrong_root() {
        let dir = tempfile::tempdir().unwrap();
        let (_, manifest) = sample_batch(dir.path());
        let outcome = verify_receipt(&VerifyArgs {
            receipt: manifest.entries[0].receipt.clone(),
            root: Some(Digest::of(b"another batch").to_hex()),
            credential: None,
        })
        .unwrap();
        assert!(!outcome.verified);
        assert_eq!(outcome.computed_root, manifest.root);
    }

    #[test]
    fn verify_reports_unparseable_receipt() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_credential(dir.path(), "not-a-receipt.json", json!({"name": "x"}));
        let err = verify_receipt(&VerifyArgs {
            receipt: path,
            root: None,
            credential: None,
        })
        .unwrap_err();
        assert!(err.to_string().contains("not an inclusion receipt"));
    }

    #[tokio::test]
    async fn simulation_reconstructs_every_entity() {
        let report = simulate(3, ReconstructorConfig::default()).await.unwrap();
        assert_eq!(report.entities.len(), 3);
        assert!(report.entities.iter().all(|e| e.anchor.is_verified()));

        let first = &report.entities[0].history;
        assert_eq!(first.len(), 2);
        assert_eq!(first.owner, Some(holder(1)));
        assert!(first.is_clean());
        assert!(first.events[0].payload.is_some());

        let last = &report.entities[2].history;
        assert_eq!(last.state, LifecycleState::Revoked);
        assert!(last.anomalies.is_empty());
    }

    #[tokio::test]
    async fn single_credential_simulation_is_issued_then_revoked() {
        let report = simulate(1, ReconstructorConfig::default()).await.unwrap();
        let history = &report.entities[0].history;
        assert_eq!(history.len(), 3);
        assert_eq!(history.state, LifecycleState::Revoked);
        assert!(!history
            .anomalies
            .iter()
            .any(|a| a.kind == AnomalyKind::EventAfterRevoke));
    }

    #[tokio::test]
    async fn empty_simulation_is_rejected() {
        assert!(simulate(0, ReconstructorConfig::default()).await.is_err());
    }

    #[test]
    fn missing_config_file_fails() {
        assert!(load_config(Some(Path::new("/nonexistent/vouch.toml"))).is_err());
        assert_eq!(load_config(None).unwrap(), ReconstructorConfig::default());
    }

    #[test]
    fn timestamps_render_in_utc() {
        assert_eq!(format_timestamp(Some(0)), "1970-01-01 00:00:00 UTC");
        assert_eq!(format_timestamp(None), "unknown time");
    }
}
