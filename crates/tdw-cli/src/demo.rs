//! # Demo Subcommand
//!
//! Walks a DID through three versions and publishes a DID configuration:
//!
//! 1. Automatic provisioning for the domain.
//! 2. An external controller key is added to the document and to the update
//!    keys. Signed by the genesis key.
//! 3. Linked-domain and linked-presentation services are added and the
//!    controller key becomes an assertion method. Signed by the controller
//!    key.
//!
//! The log is then reloaded and checked, and `did-configuration.json` is
//! written next to it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use clap::Args;
use serde_json::{json, Map};

use tdw_core::{
    DidDocument, MethodConfig, OneOrMany, ParamsUpdate, Service, VerificationRelationship,
};
use tdw_crypto::{multikey_fragment, InMemorySigner, KeyAlgorithm, KeyStore, Signer};
use tdw_state::{
    add_auth_key, auto_provision_did, load_history_path, normalize_provision_id,
    write_document_state, AutoProvisionOptions, DocumentState, VerifyOptions,
};
use tdw_vc::{create_did_configuration, verify_did_configuration, DID_CONFIGURATION_CONTEXT};

const CONTROLLER_DID: &str = "did:example:controller";
const LINKED_VP_CONTEXT: &str = "https://identity.foundation/linked-vp/contexts/v1";

/// Arguments for the `tdw demo` subcommand.
#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Domain the DID is hosted on.
    #[arg(default_value = "domain.example")]
    pub domain: String,

    /// Directory in which the DID directory is created.
    #[arg(long, default_value = ".")]
    pub base_dir: PathBuf,

    /// Pass key protecting the key store.
    #[arg(long, env = "TDW_PASS_KEY", hide_env_values = true, default_value = "password")]
    pub pass_key: String,
}

/// Execute the demo subcommand.
pub fn run_demo(args: &DemoArgs, config: &MethodConfig) -> Result<u8> {
    let dir = demo(args, config)?;
    println!("Wrote {}", dir.join(&config.did_configuration_filename).display());
    Ok(0)
}

/// Run the walkthrough and return the DID directory.
pub fn demo(args: &DemoArgs, config: &MethodConfig) -> Result<PathBuf> {
    let placeholder = normalize_provision_id(&args.domain, config)?;
    let (dir, genesis, genesis_key) = auto_provision_did(
        &placeholder,
        KeyAlgorithm::Ed25519,
        &args.pass_key,
        AutoProvisionOptions::default(),
        &args.base_dir,
        config,
    )
    .context("provisioning")?;
    let did = genesis.document_id().to_string();
    println!("Provisioned {did}");

    let controller_key = controller_key(&dir, &args.pass_key, config)?;
    let state = add_controller(&genesis, &genesis_key, &controller_key)?;
    write_document_state(&dir, &state, config)?;
    println!("Added controller key: version {}", state.version_id());

    let state = add_services(&state, &controller_key, &args.domain)?;
    write_document_state(&dir, &state, config)?;
    println!("Added services: version {}", state.version_id());

    let (latest, meta) = load_history_path(
        &dir.join(&config.history_filename),
        VerifyOptions::default(),
        config,
    )
    .context("reloading history")?;
    ensure!(latest.document() == state.document(), "reloaded document differs");
    ensure!(meta.created == genesis.timestamp(), "unexpected creation time");
    ensure!(meta.updated == state.timestamp(), "unexpected update time");
    ensure!(!meta.deactivated, "DID is unexpectedly deactivated");
    ensure!(meta.version_id == 3, "expected version 3, found {}", meta.version_id);

    let origin = format!("https://{}", args.domain);
    let configuration = create_did_configuration(&did, &origin, &controller_key, None)?;
    verify_did_configuration(&configuration, latest.document())?;
    let path = dir.join(&config.did_configuration_filename);
    std::fs::write(&path, serde_json::to_string_pretty(&configuration)?)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(dir)
}

/// Generate the external controller's key and keep it in the DID's store.
fn controller_key(dir: &Path, pass_key: &str, config: &MethodConfig) -> Result<InMemorySigner> {
    let key = InMemorySigner::generate(KeyAlgorithm::Ed25519);
    let kid = format!("{CONTROLLER_DID}{}", multikey_fragment(key.multikey())?);
    let key = key.with_kid(kid);

    let store = KeyStore::open(&dir.join(&config.keystore_filename), pass_key)?;
    store
        .session()?
        .insert_key(key.kid(), key.keypair(), BTreeMap::new())?;
    store.close()?;
    Ok(key)
}

fn add_controller(
    prior: &DocumentState,
    signer: &dyn Signer,
    controller_key: &InMemorySigner,
) -> Result<DocumentState> {
    let did = prior.document_id().to_string();
    let document = prior
        .document_copy()
        .with_controller(vec![did, CONTROLLER_DID.to_string()]);
    let document = add_auth_key(document, controller_key)?;
    let params = ParamsUpdate::new().with_update_keys(vec![
        signer.multikey().to_string(),
        controller_key.multikey().to_string(),
    ]);
    Ok(prior.next(document, Some(params), None)?.sign(signer)?)
}

fn add_services(
    prior: &DocumentState,
    signer: &dyn Signer,
    domain: &str,
) -> Result<DocumentState> {
    let did = prior.document_id();
    let document = prior
        .document_copy()
        .with_context(DID_CONFIGURATION_CONTEXT)
        .with_context(LINKED_VP_CONTEXT)
        .with_service(service(
            format!("{did}#domain"),
            "LinkedDomains",
            format!("https://{domain}"),
        ))
        .with_service(service(
            format!("{did}#whois"),
            "LinkedVerifiablePresentation",
            format!("https://{domain}/.well-known/whois.jsonld"),
        ));
    let first_auth = first_authentication(&document)?;
    let document = document.with_assertion_methods(vec![first_auth]);
    Ok(prior.next(document, None, None)?.sign(signer)?)
}

fn service(id: String, type_: &str, endpoint: String) -> Service {
    Service {
        id,
        type_: OneOrMany::One(type_.to_string()),
        service_endpoint: json!(endpoint),
        extra: Map::new(),
    }
}

fn first_authentication(document: &DidDocument) -> Result<VerificationRelationship> {
    let first = document
        .authentication
        .as_ref()
        .and_then(|auth| auth.first())
        .context("document has no authentication method")?;
    Ok(VerificationRelationship::Reference(first.id().to_string()))
}
