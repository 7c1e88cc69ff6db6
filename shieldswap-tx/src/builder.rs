//! The private transaction builder.
//!
//! Unshield, transfer and swap share one skeleton:
//!
//! ```text
//!  connect relay ─► sync ─► quote relay ─► gas estimate (draft, full amount)
//!        ─► layered fees ─► finalize ─► prove (15–80 %) ─► populate
//!        ─► submit via relay ─► confirm ─► resync
//! ```
//!
//! Shielding is paid for by the user's public wallet and skips the relay.

use std::sync::Arc;
use std::time::Duration;

use ethers::types::{H256, U256};
use serde::{Deserialize, Serialize};
use shieldswap_common::{
    NetworkConfig, ProgressEvent, ProgressRange, ProgressReporter, ProgressStage, RelayQuote,
    TokenAmount,
};
use shieldswap_engine::{
    FeeNote, GasDetails, PopulatedTransaction, ProofRequest, PublicWallet, ShieldRequest,
    WalletError,
};
use shieldswap_relay::{chain_ref, RelaySubmission};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::context::PrivacyContext;
use crate::error::TxError;
use crate::fees::{layer_fees, relay_fee, scale_min_out, FeeBreakdown, FeeInputs, FeeSource};
use crate::plan::{ConfirmedTx, ShieldIntent, SpendAction, SpendRequest, TransactionPlan, TxOutcome};
use crate::shield::{derive_shield_key, SHIELD_SIGNATURE_MESSAGE};
use crate::swap::swap_calls;

// Overall progress checkpoints; proving owns 15–80.
const PCT_CONNECTED: f64 = 3.0;
const PCT_SYNCED: f64 = 8.0;
const PCT_QUOTED: f64 = 11.0;
const PCT_ESTIMATED: f64 = 14.0;
const PCT_POPULATED: f64 = 83.0;
const PCT_SUBMITTED: f64 = 88.0;
const PCT_CONFIRMED: f64 = 95.0;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuilderSettings {
    /// Application fee in basis points, charged after the protocol fee.
    #[serde(default)]
    pub application_fee_bps: u32,
    /// Shielded address receiving the application fee. No recipient, no fee.
    #[serde(default)]
    pub application_fee_recipient: Option<String>,
    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
}

impl Default for BuilderSettings {
    fn default() -> Self {
        Self {
            application_fee_bps: 0,
            application_fee_recipient: None,
            receipt_timeout_secs: default_receipt_timeout_secs(),
        }
    }
}

fn default_receipt_timeout_secs() -> u64 {
    300
}

impl BuilderSettings {
    fn application_fee_bps(&self) -> u32 {
        match &self.application_fee_recipient {
            Some(_) => self.application_fee_bps,
            None => 0,
        }
    }
}

pub struct PrivateTransactionBuilder {
    ctx: Arc<PrivacyContext>,
    settings: BuilderSettings,
}

impl PrivateTransactionBuilder {
    pub fn new(ctx: Arc<PrivacyContext>, settings: BuilderSettings) -> Self {
        Self { ctx, settings }
    }

    pub fn context(&self) -> &Arc<PrivacyContext> {
        &self.ctx
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SPENDS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Run an unshield, transfer or swap end to end.
    pub async fn spend(
        &self,
        request: &SpendRequest,
        progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
    ) -> Result<TxOutcome, TxError> {
        let mut reporter = ProgressReporter::from_option(progress);
        let mut plan = self.plan_spend(request, &mut reporter).await?;
        let network = self.ctx.network(&request.network)?;

        self.prove(&plan.request, &mut reporter).await?;

        let gas = GasDetails {
            gas_type: network.gas_type,
            gas_price: plan.gas_price,
            gas_limit: Some(plan.gas_estimate),
        };
        let populated = self
            .ctx
            .bootstrap()
            .engine()
            .populate_proved(&plan.request, &gas)
            .await?;
        if populated.nullifiers.is_empty() {
            return Err(TxError::MissingNullifiers);
        }
        reporter.report(ProgressStage::Populating, PCT_POPULATED);
        plan.populated = Some(populated.clone());

        let tx_hash = self.submit(network, &plan, &populated).await?;
        reporter.report(ProgressStage::Submitting, PCT_SUBMITTED);

        self.confirm(network, tx_hash).await?;
        reporter.report(ProgressStage::Confirming, PCT_CONFIRMED);

        self.resync(request, &mut reporter).await;
        reporter.complete();
        info!(
            network = %network.name,
            kind = %plan.kind,
            ?tx_hash,
            adjusted = %plan.fees.adjusted_amount,
            "private transaction confirmed"
        );

        Ok(TxOutcome::Confirmed(ConfirmedTx {
            network: network.name.clone(),
            tx_hash,
            fees: Some(plan.fees),
        }))
    }

    /// Everything up to, but not including, proof generation.
    pub async fn plan_spend(
        &self,
        request: &SpendRequest,
        reporter: &mut ProgressReporter,
    ) -> Result<TransactionPlan, TxError> {
        if request.spend.amount.is_zero() {
            return Err(TxError::InvalidRequest("spend amount is zero".into()));
        }
        let network = self.ctx.prepare(&request.network).await?;
        let engine = self.ctx.bootstrap().engine().clone();
        let kind = request.kind();

        self.ctx
            .relays()
            .ensure_connected(&network.name)
            .await
            .map_err(|_| TxError::NoRelayAvailable(network.name.clone()))?;
        reporter.report(ProgressStage::Connecting, PCT_CONNECTED);

        self.ctx.ensure_wallet(&request.wallet).await?;
        self.ctx
            .balances()
            .refresh(&network.name, std::slice::from_ref(&request.wallet.id), true)
            .await?;
        reporter.report(ProgressStage::Syncing, PCT_SYNCED);

        let quote = self
            .ctx
            .relays()
            .find_relay(&network.name, request.fee.token, request.fee.native)
            .await
            .ok_or_else(|| TxError::NoRelayAvailable(network.name.clone()))?;
        reporter.report(ProgressStage::QuotingRelay, PCT_QUOTED);

        let gas_price = self.ctx.chain(&network.name)?.gas_price(network.gas_type).await?;
        let draft = self.proof_request(
            network,
            request,
            request.spend.amount,
            request.spend.amount,
            request.min_out(),
            relay_fee_note(&quote, U256::zero()),
            None,
            gas_price,
        )?;
        let gas_estimate = engine
            .gas_estimate_for_unproven(
                &draft,
                &GasDetails {
                    gas_type: network.gas_type,
                    gas_price,
                    gas_limit: None,
                },
            )
            .await?;
        reporter.report(ProgressStage::EstimatingGas, PCT_ESTIMATED);

        let fees = self
            .layered_fees(network, request, &quote, gas_estimate, gas_price)
            .await?;
        let min_out = request
            .min_out()
            .map(|min_out| scale_min_out(min_out, fees.adjusted_amount, fees.original_amount));
        debug!(
            network = %network.name,
            protocol_fee = %fees.protocol_fee,
            application_fee = %fees.application_fee,
            relay_fee = %fees.relay_fee,
            adjusted = %fees.adjusted_amount,
            "fees layered"
        );

        let application_fee = match &self.settings.application_fee_recipient {
            Some(recipient) if !fees.application_fee.is_zero() => Some(FeeNote {
                recipient: recipient.clone(),
                fee: TokenAmount::new(request.spend.token, fees.application_fee),
            }),
            _ => None,
        };
        let request_final = self.proof_request(
            network,
            request,
            fees.unshield_amount,
            fees.adjusted_amount,
            min_out,
            relay_fee_note(&quote, fees.relay_fee),
            application_fee,
            gas_price,
        )?;

        Ok(TransactionPlan {
            network: network.name.clone(),
            kind,
            spend: request.spend,
            relay: quote,
            gas_estimate,
            gas_price,
            fees,
            min_out,
            request: request_final,
            populated: None,
        })
    }

    async fn layered_fees(
        &self,
        network: &NetworkConfig,
        request: &SpendRequest,
        quote: &RelayQuote,
        gas_estimate: U256,
        gas_price: U256,
    ) -> Result<FeeBreakdown, TxError> {
        let relay_fee = relay_fee(quote, gas_estimate, gas_price);
        let relay_fee_source = if quote.fee_token == request.spend.token {
            FeeSource::SpentToken
        } else {
            FeeSource::SeparateToken(quote.fee_token)
        };

        let protocol_fee_bps = if request.kind().pays_unshield_fee() {
            network.unshield_fee_bps
        } else {
            0
        };
        let fees = layer_fees(FeeInputs {
            amount: request.spend.amount,
            protocol_fee_bps,
            application_fee_bps: self.settings.application_fee_bps(),
            relay_fee,
            relay_fee_source,
        })?;

        if let FeeSource::SeparateToken(token) = relay_fee_source {
            let available = self
                .ctx
                .balances()
                .spendable(&network.name, &request.wallet.id, token)
                .await?;
            if available < relay_fee {
                return Err(TxError::InsufficientFeeTokenBalance {
                    token,
                    required: relay_fee,
                    available,
                });
            }
        }
        Ok(fees)
    }

    #[allow(clippy::too_many_arguments)]
    fn proof_request(
        &self,
        network: &NetworkConfig,
        request: &SpendRequest,
        amount: U256,
        delivered: U256,
        min_out: Option<U256>,
        relay_fee: FeeNote,
        application_fee: Option<FeeNote>,
        gas_price: U256,
    ) -> Result<ProofRequest, TxError> {
        let (recipient, calls, reshield_tokens) = match &request.action {
            SpendAction::Unshield { to } => (format!("{:?}", to), Vec::new(), Vec::new()),
            SpendAction::Transfer { to } => (to.clone(), Vec::new(), Vec::new()),
            SpendAction::Swap { quote, reshield_to } => {
                let relay_adapt = network.relay_adapt_contract.ok_or_else(|| {
                    TxError::InvalidRequest(format!("{} has no relay adapt contract", network.name))
                })?;
                // The router spends what the pool hands to the relay adapt
                // contract, not the gross unshield.
                let calls = swap_calls(quote, delivered, min_out.unwrap_or_default(), relay_adapt);
                (reshield_to.clone(), calls, vec![quote.buy_token])
            }
        };

        Ok(ProofRequest {
            network: network.name.clone(),
            txid_version: network.txid_version,
            kind: request.kind(),
            wallet: request.wallet.id.clone(),
            encryption_key: request.wallet.encryption_key.clone(),
            recipient,
            amounts: vec![TokenAmount::new(request.spend.token, amount)],
            calls,
            reshield_tokens,
            relay_fee: Some(relay_fee),
            application_fee,
            min_gas_price: gas_price,
        })
    }

    /// Generate the proof while forwarding engine progress into 15–80 %.
    async fn prove(&self, request: &ProofRequest, reporter: &mut ProgressReporter) -> Result<(), TxError> {
        let engine = self.ctx.bootstrap().engine();
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<f64>();
        reporter.report(ProgressStage::Proving, ProgressRange::PROOF.start);

        let generate = engine.generate_proof(request, progress_tx);
        let forward = async {
            while let Some(inner) = progress_rx.recv().await {
                reporter.report(ProgressStage::Proving, ProgressRange::PROOF.map(inner));
            }
        };
        let (result, ()) = tokio::join!(generate, forward);
        result.map_err(TxError::ProofGenerationFailed)?;

        reporter.report(ProgressStage::Proving, ProgressRange::PROOF.end);
        Ok(())
    }

    async fn submit(
        &self,
        network: &NetworkConfig,
        plan: &TransactionPlan,
        populated: &PopulatedTransaction,
    ) -> Result<H256, TxError> {
        let submission = RelaySubmission {
            chain: chain_ref(network),
            txid_version: network.txid_version,
            to: populated.transaction.to,
            data: populated.transaction.data.clone(),
            relay_address: plan.relay.relay_address.clone(),
            fees_id: plan.relay.fees_id.clone(),
            nullifiers: populated.nullifiers.clone(),
            min_gas_price: plan.gas_price,
            use_relay_adapt: plan.kind.uses_relay_adapt(),
            poi_proofs: populated.poi_proofs.clone(),
        };
        self.ctx
            .relays()
            .submit(&network.name, &submission)
            .await
            .map_err(|err| TxError::SubmissionFailed(err.to_string()))
    }

    async fn confirm(&self, network: &NetworkConfig, tx_hash: H256) -> Result<(), TxError> {
        let receipt = self
            .ctx
            .chain(&network.name)?
            .wait_for_receipt(tx_hash, Duration::from_secs(self.settings.receipt_timeout_secs))
            .await?;
        if !receipt.succeeded() {
            warn!(network = %network.name, ?tx_hash, "transaction reverted");
            return Err(TxError::TransactionReverted(tx_hash));
        }
        Ok(())
    }

    /// The transaction already landed; a failed rescan is only logged.
    async fn resync(&self, request: &SpendRequest, reporter: &mut ProgressReporter) {
        reporter.report(ProgressStage::Resyncing, PCT_CONFIRMED);
        if let Err(err) = self
            .ctx
            .balances()
            .refresh(&request.network, std::slice::from_ref(&request.wallet.id), true)
            .await
        {
            warn!(network = %request.network, error = %err, "post-transaction resync failed");
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SHIELD
    // ═══════════════════════════════════════════════════════════════════════════

    /// Move public tokens into the shielded pool from the user's public wallet.
    ///
    /// A refusal in the wallet is an outcome, not an error.
    pub async fn shield(
        &self,
        intent: &ShieldIntent,
        wallet: &dyn PublicWallet,
        progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
    ) -> Result<TxOutcome, TxError> {
        let mut reporter = ProgressReporter::from_option(progress);
        if intent.tokens.is_empty() || intent.tokens.iter().any(|t| t.amount.is_zero()) {
            return Err(TxError::InvalidRequest("nothing to shield".into()));
        }
        let network = self.ctx.prepare(&intent.network).await?;
        let engine = self.ctx.bootstrap().engine().clone();
        reporter.report(ProgressStage::Connecting, PCT_CONNECTED);

        let signature = match wallet.sign_message(SHIELD_SIGNATURE_MESSAGE.as_bytes()).await {
            Ok(signature) => signature,
            Err(WalletError::UserRejected) => {
                info!(network = %network.name, "shield signature rejected by user");
                return Ok(TxOutcome::UserRejected);
            }
            Err(err) => return Err(TxError::Wallet(err)),
        };
        reporter.report(ProgressStage::Signing, PCT_SYNCED);

        let shield_request = ShieldRequest {
            network: network.name.clone(),
            txid_version: network.txid_version,
            shield_private_key: derive_shield_key(&signature),
            recipient: intent.recipient.clone(),
            tokens: intent.tokens.clone(),
            from_address: wallet.address(),
        };
        let gas_estimate = engine.gas_estimate_for_shield(&shield_request).await?;
        let gas_price = self.ctx.chain(&network.name)?.gas_price(network.gas_type).await?;
        reporter.report(ProgressStage::EstimatingGas, PCT_ESTIMATED);

        let transaction = engine
            .populate_shield(
                &shield_request,
                &GasDetails {
                    gas_type: network.gas_type,
                    gas_price,
                    gas_limit: Some(gas_estimate),
                },
            )
            .await?;
        reporter.report(ProgressStage::Populating, PCT_POPULATED);

        let tx_hash = match wallet.send_transaction(&transaction).await {
            Ok(tx_hash) => tx_hash,
            Err(WalletError::UserRejected) => {
                info!(network = %network.name, "shield transaction rejected by user");
                return Ok(TxOutcome::UserRejected);
            }
            Err(err) => return Err(TxError::SubmissionFailed(err.to_string())),
        };
        reporter.report(ProgressStage::Submitting, PCT_SUBMITTED);

        self.confirm(network, tx_hash).await?;
        reporter.report(ProgressStage::Resyncing, PCT_CONFIRMED);

        if let Err(err) = self
            .ctx
            .balances()
            .refresh(&network.name, &[], true)
            .await
        {
            warn!(network = %network.name, error = %err, "post-shield resync failed");
        }
        reporter.complete();
        info!(network = %network.name, ?tx_hash, tokens = intent.tokens.len(), "shield confirmed");

        Ok(TxOutcome::Confirmed(ConfirmedTx {
            network: network.name.clone(),
            tx_hash,
            fees: None,
        }))
    }
}

fn relay_fee_note(quote: &RelayQuote, amount: U256) -> FeeNote {
    FeeNote {
        recipient: quote.relay_address.clone(),
        fee: TokenAmount::new(quote.fee_token, amount),
    }
}
