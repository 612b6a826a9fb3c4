//! The generation workflow controller.
//!
//! A [`Studio`] owns all per-session state and sequences every
//! credit-consuming action: upload, background removal, full generation,
//! per-image regeneration, and purchase top-ups. Each operation checks its
//! preconditions before any backend call and commits its whole side-effect
//! bundle only after a confirmed success, so a failure anywhere leaves the
//! session exactly as it was.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;

use crate::assets::{self, AdCopy, GeneratedImage, ImageAsset};
use crate::backend::{GenerationBackend, ImagePayload};
use crate::config::SharedAdminConfig;
use crate::credits::CreditLedger;
use crate::error::StudioError;
use crate::history::{HistoryItem, HistoryStore};
use crate::image_ops;
use crate::payments::{self, CheckoutIntent, Gateway, PaymentError, PaymentVerifier};
use crate::settings::Settings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
    pub email: String,
}

/// Directive returned by a successful generation when the admin has enabled
/// auto-deletion. The caller arms a timer that calls
/// [`Studio::clear_generated`] with the captured epoch; arming must cancel
/// any previously pending timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoClear {
    pub after: Duration,
    pub epoch: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateOutcome {
    pub rendered: usize,
    /// Backend-returned images that failed to decode and were dropped
    /// without charge.
    pub dropped: usize,
    pub charged: u32,
    pub auto_clear: Option<AutoClear>,
}

#[derive(Debug)]
struct PendingCheckout {
    reference: String,
    gateway: Gateway,
    credits: u32,
    price_usd: u32,
}

pub struct Studio {
    backend: Arc<dyn GenerationBackend>,
    verifier: Arc<dyn PaymentVerifier>,
    admin: SharedAdminConfig,
    settings: Settings,
    user: Option<UserAccount>,
    ledger: CreditLedger,
    source: Option<ImageAsset>,
    images: Vec<GeneratedImage>,
    ad_copies: Vec<AdCopy>,
    history: HistoryStore,
    /// Bumped whenever the generated result set is replaced or torn down;
    /// deferred clears carry the epoch they were armed with and are ignored
    /// once it is stale.
    run_epoch: u64,
    pending_checkouts: Vec<PendingCheckout>,
}

impl std::fmt::Debug for Studio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Studio")
            .field("settings", &self.settings)
            .field("user", &self.user)
            .field("ledger", &self.ledger)
            .field("source", &self.source)
            .field("images", &self.images)
            .field("ad_copies", &self.ad_copies)
            .field("history", &self.history)
            .field("run_epoch", &self.run_epoch)
            .field("pending_checkouts", &self.pending_checkouts)
            .finish_non_exhaustive()
    }
}

impl Studio {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        verifier: Arc<dyn PaymentVerifier>,
        admin: SharedAdminConfig,
    ) -> Self {
        Self {
            backend,
            verifier,
            admin,
            settings: Settings::default(),
            user: None,
            ledger: CreditLedger::default(),
            source: None,
            images: Vec::new(),
            ad_copies: Vec::new(),
            history: HistoryStore::default(),
            run_epoch: 0,
            pending_checkouts: Vec::new(),
        }
    }

    pub fn user(&self) -> Option<&UserAccount> {
        self.user.as_ref()
    }

    pub fn credits(&self) -> u32 {
        self.ledger.balance()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: Settings) -> Result<(), StudioError> {
        settings.validate()?;
        self.settings = settings;
        Ok(())
    }

    pub fn source(&self) -> Option<&ImageAsset> {
        self.source.as_ref()
    }

    pub fn images(&self) -> &[GeneratedImage] {
        &self.images
    }

    pub fn ad_copies(&self) -> &[AdCopy] {
        &self.ad_copies
    }

    pub fn history(&self) -> &[HistoryItem] {
        self.history.items()
    }

    fn require_user(&self) -> Result<&UserAccount, StudioError> {
        self.user.as_ref().ok_or(StudioError::NotAuthenticated)
    }

    fn source_payload(&self) -> Result<ImagePayload, StudioError> {
        let source = self.source.as_ref().ok_or(StudioError::NoSourceImage)?;
        Ok(ImagePayload {
            base64: source.base64.clone(),
            mime_type: source.mime_type.clone(),
        })
    }

    /// Authenticate and start a fresh session: history is wiped and the
    /// ledger resets to the admin-configured grant. Any balance left from a
    /// previous session is intentionally discarded.
    pub fn login(&mut self, email: &str) {
        self.user = Some(UserAccount {
            email: email.to_string(),
        });
        self.history.clear();
        self.pending_checkouts.clear();
        self.ledger.reset(self.admin.get().default_credits);
        tracing::info!(email, credits = self.ledger.balance(), "user logged in");
    }

    /// Tear the authenticated session down. The uploaded source image
    /// survives; everything derived from paid actions does not.
    pub fn logout(&mut self) {
        self.user = None;
        self.images.clear();
        self.ad_copies.clear();
        self.history.clear();
        self.pending_checkouts.clear();
        self.ledger.reset(0);
        self.run_epoch += 1;
        tracing::info!("user logged out");
    }

    /// Replace the working image. Free; resets all generated results and
    /// supersedes any pending deferred clear.
    pub fn upload_image(&mut self, name: &str, bytes: &[u8]) -> Result<&ImageAsset, StudioError> {
        let mime_type = assets::detect_mime_type(bytes).ok_or(StudioError::UnsupportedUpload)?;
        let asset = ImageAsset::from_upload(name, bytes, mime_type);
        tracing::info!(name, mime_type, size = bytes.len(), "source image uploaded");
        self.images.clear();
        self.ad_copies.clear();
        self.run_epoch += 1;
        Ok(&*self.source.insert(asset))
    }

    /// Remove the background of the current source image. Costs 1 credit,
    /// deducted only after the replacement asset is in hand.
    pub async fn remove_background(&mut self) -> Result<&ImageAsset, StudioError> {
        self.require_user()?;
        let payload = self.source_payload()?;
        self.ledger.require(1)?;

        let result = self.backend.remove_background(&payload).await?;

        let source = self.source.as_ref().ok_or(StudioError::Superseded)?;
        let replacement = source.background_removed(result.base64);
        tracing::info!(name = %replacement.name, "background removed");
        self.ledger.deduct(1)?;
        Ok(&*self.source.insert(replacement))
    }

    /// Run a full generation: N images plus ad copies, watermarked,
    /// thumbnailed, charged, and recorded as one history item.
    ///
    /// Charging policy: the cost is the number of images actually delivered
    /// and rendered, never more than the requested count. Images that fail
    /// to decode are dropped without charge; if none survive the whole run
    /// fails and nothing is charged.
    pub async fn generate(&mut self) -> Result<GenerateOutcome, StudioError> {
        self.require_user()?;
        let payload = self.source_payload()?;
        let requested = self.settings.number_of_images;
        self.ledger.require(requested)?;

        let response = self.backend.generate(&payload, &self.settings).await?;

        let mut rendered: Vec<Vec<u8>> = Vec::new();
        let mut dropped = 0usize;
        for item in response
            .generated_images
            .into_iter()
            .take(requested as usize)
        {
            match image_ops::render_watermarked(&item.base64, &item.mime_type) {
                Ok(png) => rendered.push(png),
                Err(err) => {
                    dropped += 1;
                    tracing::warn!(%err, "dropping generated image that failed to render");
                }
            }
        }
        if rendered.is_empty() {
            return Err(StudioError::NothingRendered);
        }

        let mut thumbnails = Vec::with_capacity(rendered.len());
        for png in &rendered {
            let jpeg = image_ops::thumbnail_jpeg(png, "image/png")?;
            thumbnails.push(assets::data_uri("image/jpeg", &BASE64.encode(jpeg)));
        }

        let run_id = Utc::now().timestamp_millis();
        let images: Vec<GeneratedImage> = rendered
            .iter()
            .enumerate()
            .map(|(index, png)| GeneratedImage {
                id: format!("{run_id}-{index}"),
                rendered_src: assets::data_uri("image/png", &BASE64.encode(png)),
            })
            .collect();
        let ad_copies: Vec<AdCopy> = response
            .generated_ad_copies
            .into_iter()
            .enumerate()
            .map(|(index, text)| AdCopy {
                id: format!("{run_id}-{index}"),
                text,
            })
            .collect();

        let rendered_count = rendered.len();
        let charged = rendered_count as u32;

        // Commit: everything fallible is behind us.
        self.ledger.deduct(charged)?;
        self.images = images;
        self.ad_copies = ad_copies.clone();
        self.history.record(HistoryItem {
            id: run_id.to_string(),
            timestamp: Utc::now(),
            image_prompt: self.settings.image_prompt(),
            thumbnails,
            ad_copies,
        });
        self.run_epoch += 1;
        let auto_clear = self.admin.get().auto_clear_after().map(|after| AutoClear {
            after,
            epoch: self.run_epoch,
        });

        tracing::info!(
            rendered = rendered_count,
            dropped,
            charged,
            balance = self.ledger.balance(),
            "generation run completed"
        );
        Ok(GenerateOutcome {
            rendered: rendered_count,
            dropped,
            charged,
            auto_clear,
        })
    }

    /// Regenerate a single image by id with a new prompt. Only the matching
    /// image's rendered source is replaced; if the target vanished while the
    /// call was in flight the late result is discarded and nothing is
    /// charged.
    pub async fn regenerate_image(
        &mut self,
        image_id: &str,
        prompt: &str,
    ) -> Result<(), StudioError> {
        self.require_user()?;
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(StudioError::EmptyPrompt);
        }
        if !self.images.iter().any(|image| image.id == image_id) {
            return Err(StudioError::UnknownImage(image_id.to_string()));
        }
        let payload = self.source_payload()?;
        self.ledger.require(1)?;

        let result = self
            .backend
            .regenerate(
                &payload,
                prompt,
                self.settings.resolution,
                self.settings.aspect_ratio,
            )
            .await?;
        let png = image_ops::render_watermarked(&result.base64, &result.mime_type)?;
        let rendered_src = assets::data_uri("image/png", &BASE64.encode(png));

        match self.images.iter_mut().find(|image| image.id == image_id) {
            Some(image) => {
                image.rendered_src = rendered_src;
                self.ledger.deduct(1)?;
                tracing::info!(image_id, "image regenerated");
                Ok(())
            }
            None => {
                tracing::warn!(image_id, "discarding regeneration result for vanished target");
                Err(StudioError::Superseded)
            }
        }
    }

    /// Deferred-clear entry point for the auto-delete timer. A stale epoch
    /// means the result set was already replaced or torn down.
    pub fn clear_generated(&mut self, epoch: u64) {
        if epoch != self.run_epoch {
            tracing::debug!(epoch, current = self.run_epoch, "stale auto-clear ignored");
            return;
        }
        self.images.clear();
        self.ad_copies.clear();
        tracing::info!("generated results auto-cleared");
    }

    /// Open a checkout for a credit package. No ledger change until the
    /// purchase is verified.
    pub fn begin_checkout(
        &mut self,
        package_id: &str,
        gateway: Gateway,
    ) -> Result<CheckoutIntent, StudioError> {
        let user = self.require_user()?;
        let package = payments::find_package(package_id)
            .ok_or_else(|| PaymentError::UnknownPackage(package_id.to_string()))?;
        let config = self.admin.get();
        let intent = payments::begin_checkout(
            &config,
            &user.email,
            package,
            gateway,
            Utc::now().timestamp_millis(),
        )?;
        self.pending_checkouts.push(PendingCheckout {
            reference: intent.reference.clone(),
            gateway,
            credits: package.credits,
            price_usd: package.price_usd,
        });
        tracing::info!(reference = %intent.reference, credits = package.credits, "checkout opened");
        Ok(intent)
    }

    /// Credit the ledger for a checkout, but only after the gateway itself
    /// confirms the transaction.
    pub async fn confirm_purchase(&mut self, reference: &str) -> Result<u32, StudioError> {
        self.require_user()?;
        let position = self
            .pending_checkouts
            .iter()
            .position(|pending| pending.reference == reference)
            .ok_or(PaymentError::UnknownReference)?;
        let (gateway, price_usd) = {
            let pending = &self.pending_checkouts[position];
            (pending.gateway, pending.price_usd)
        };
        let config = self.admin.get();
        self.verifier
            .verify(&config, gateway, reference, price_usd)
            .await?;

        let pending = self.pending_checkouts.remove(position);
        self.ledger.credit(pending.credits);
        tracing::info!(
            reference,
            credits = pending.credits,
            balance = self.ledger.balance(),
            "purchase verified and credited"
        );
        Ok(pending.credits)
    }

    /// User abandoned the checkout widget: forget the reference, leave the
    /// ledger alone.
    pub fn cancel_checkout(&mut self, reference: &str) {
        self.pending_checkouts
            .retain(|pending| pending.reference != reference);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use image::{DynamicImage, Rgba, RgbaImage};

    use crate::backend::{BackendError, GenerateResponse};
    use crate::config::AdminConfig;
    use crate::settings::{AspectRatio, Resolution};

    fn png_base64(shade: u8) -> String {
        let image = RgbaImage::from_pixel(160, 90, Rgba([shade, shade, shade, 255]));
        BASE64.encode(image_ops::encode_png(&DynamicImage::ImageRgba8(image)).unwrap())
    }

    fn png_payload(shade: u8) -> ImagePayload {
        ImagePayload {
            base64: png_base64(shade),
            mime_type: "image/png".to_string(),
        }
    }

    fn upload_bytes() -> Vec<u8> {
        let image = RgbaImage::from_pixel(120, 120, Rgba([200, 10, 10, 255]));
        image_ops::encode_png(&DynamicImage::ImageRgba8(image)).unwrap()
    }

    #[derive(Default)]
    struct ScriptedBackend {
        calls: AtomicUsize,
        fail: bool,
        images_per_run: usize,
        undecodable_per_run: usize,
        ad_copies_per_run: usize,
    }

    impl ScriptedBackend {
        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GenerationBackend for ScriptedBackend {
        async fn generate(
            &self,
            _image: &ImagePayload,
            _settings: &Settings,
        ) -> Result<GenerateResponse, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(BackendError::Api {
                    status: 500,
                    message: "model overloaded".to_string(),
                });
            }
            let mut generated_images: Vec<ImagePayload> = (0..self.images_per_run)
                .map(|index| png_payload(40 + index as u8))
                .collect();
            for _ in 0..self.undecodable_per_run {
                generated_images.push(ImagePayload {
                    base64: BASE64.encode(b"not an image"),
                    mime_type: "image/png".to_string(),
                });
            }
            Ok(GenerateResponse {
                generated_images,
                generated_ad_copies: (0..self.ad_copies_per_run)
                    .map(|index| format!("Ad copy number {index}."))
                    .collect(),
            })
        }

        async fn regenerate(
            &self,
            _image: &ImagePayload,
            _prompt: &str,
            _resolution: Resolution,
            _aspect_ratio: AspectRatio,
        ) -> Result<ImagePayload, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(BackendError::Api {
                    status: 500,
                    message: "model overloaded".to_string(),
                });
            }
            Ok(png_payload(222))
        }

        async fn remove_background(
            &self,
            _image: &ImagePayload,
        ) -> Result<ImagePayload, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(BackendError::Api {
                    status: 500,
                    message: "model overloaded".to_string(),
                });
            }
            Ok(png_payload(230))
        }
    }

    struct ScriptedVerifier {
        approve: bool,
        calls: AtomicUsize,
    }

    impl ScriptedVerifier {
        fn approving() -> Self {
            Self { approve: true, calls: AtomicUsize::new(0) }
        }

        fn rejecting() -> Self {
            Self { approve: false, calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl PaymentVerifier for ScriptedVerifier {
        async fn verify(
            &self,
            _config: &AdminConfig,
            _gateway: Gateway,
            _reference: &str,
            _expected_usd: u32,
        ) -> Result<(), PaymentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.approve {
                Ok(())
            } else {
                Err(PaymentError::Unverified("transaction status is failed".to_string()))
            }
        }
    }

    fn admin_with(default_credits: u32, auto_delete_hours: u32) -> SharedAdminConfig {
        SharedAdminConfig::new(AdminConfig {
            paystack_public_key: "pk_test".to_string(),
            paystack_secret_key: "sk_test".to_string(),
            default_credits,
            image_auto_delete_hours: auto_delete_hours,
            ..AdminConfig::default()
        })
    }

    fn studio_with(
        backend: Arc<ScriptedBackend>,
        verifier: Arc<ScriptedVerifier>,
        admin: SharedAdminConfig,
    ) -> Studio {
        Studio::new(backend, verifier, admin)
    }

    fn ready_studio(backend: Arc<ScriptedBackend>, default_credits: u32) -> Studio {
        let mut studio = studio_with(
            backend,
            Arc::new(ScriptedVerifier::approving()),
            admin_with(default_credits, 0),
        );
        studio.login("ada@example.com");
        studio.upload_image("product.png", &upload_bytes()).unwrap();
        studio
    }

    #[tokio::test]
    async fn paid_actions_require_a_logged_in_user() {
        let backend = Arc::new(ScriptedBackend { images_per_run: 1, ..Default::default() });
        let mut studio = studio_with(
            backend.clone(),
            Arc::new(ScriptedVerifier::approving()),
            admin_with(20, 0),
        );
        studio.upload_image("product.png", &upload_bytes()).unwrap();

        assert_matches!(studio.generate().await, Err(StudioError::NotAuthenticated));
        assert_matches!(
            studio.remove_background().await,
            Err(StudioError::NotAuthenticated)
        );
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn generation_requires_a_source_image() {
        let backend = Arc::new(ScriptedBackend { images_per_run: 1, ..Default::default() });
        let mut studio = studio_with(
            backend.clone(),
            Arc::new(ScriptedVerifier::approving()),
            admin_with(20, 0),
        );
        studio.login("ada@example.com");

        assert_matches!(studio.generate().await, Err(StudioError::NoSourceImage));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn insufficient_credits_block_before_any_network_call() {
        let backend = Arc::new(ScriptedBackend { images_per_run: 1, ..Default::default() });
        let mut studio = ready_studio(backend.clone(), 0);

        let err = studio.remove_background().await.unwrap_err();
        assert_matches!(
            err,
            StudioError::InsufficientCredits(e) if e.needed == 1 && e.available == 0
        );
        assert_eq!(backend.call_count(), 0);
        assert_eq!(studio.credits(), 0);
    }

    #[tokio::test]
    async fn full_run_charges_exactly_and_records_one_history_item() {
        let backend = Arc::new(ScriptedBackend {
            images_per_run: 5,
            ad_copies_per_run: 5,
            ..Default::default()
        });
        let mut studio = ready_studio(backend.clone(), 5);

        let outcome = studio.generate().await.unwrap();
        assert_eq!(outcome.rendered, 5);
        assert_eq!(outcome.charged, 5);
        assert_eq!(outcome.dropped, 0);
        assert_eq!(studio.credits(), 0);
        assert_eq!(studio.images().len(), 5);
        assert_eq!(studio.ad_copies().len(), 5);
        assert_eq!(studio.history().len(), 1);
        assert_eq!(studio.history()[0].thumbnails.len(), 5);
        assert_eq!(studio.history()[0].ad_copies.len(), 5);
        assert_eq!(
            studio.history()[0].image_prompt,
            "A professional studio product shot. Style: Plain White Background."
        );
    }

    #[tokio::test]
    async fn failed_backend_call_leaves_everything_untouched() {
        let backend = Arc::new(ScriptedBackend { fail: true, ..Default::default() });
        let mut studio = ready_studio(backend.clone(), 20);

        let err = studio.generate().await.unwrap_err();
        assert_matches!(err, StudioError::Backend(BackendError::Api { status: 500, .. }));
        assert_eq!(studio.credits(), 20);
        assert!(studio.images().is_empty());
        assert!(studio.history().is_empty());
    }

    #[tokio::test]
    async fn undecodable_images_are_dropped_and_not_charged() {
        let backend = Arc::new(ScriptedBackend {
            images_per_run: 3,
            undecodable_per_run: 2,
            ad_copies_per_run: 5,
            ..Default::default()
        });
        let mut studio = ready_studio(backend.clone(), 5);

        let outcome = studio.generate().await.unwrap();
        assert_eq!(outcome.rendered, 3);
        assert_eq!(outcome.dropped, 2);
        assert_eq!(outcome.charged, 3);
        assert_eq!(studio.credits(), 2);
        assert_eq!(studio.history()[0].thumbnails.len(), 3);
    }

    #[tokio::test]
    async fn surplus_backend_images_are_capped_at_the_requested_count() {
        let backend = Arc::new(ScriptedBackend {
            images_per_run: 8,
            ad_copies_per_run: 5,
            ..Default::default()
        });
        let mut studio = ready_studio(backend.clone(), 5);

        let outcome = studio.generate().await.unwrap();
        assert_eq!(outcome.rendered, 5);
        assert_eq!(outcome.charged, 5);
        assert_eq!(studio.credits(), 0);
    }

    #[tokio::test]
    async fn remove_background_renames_and_costs_one_credit() {
        let backend = Arc::new(ScriptedBackend::default());
        let mut studio = ready_studio(backend.clone(), 3);

        let asset = studio.remove_background().await.unwrap();
        assert_eq!(asset.name, "product-no-bg.png");
        assert_eq!(asset.mime_type, "image/png");
        assert_eq!(studio.credits(), 2);
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn regenerate_replaces_only_the_target_image() {
        let backend = Arc::new(ScriptedBackend {
            images_per_run: 3,
            ad_copies_per_run: 2,
            ..Default::default()
        });
        let mut studio = ready_studio(backend.clone(), 10);
        studio.generate().await.unwrap();

        let before: Vec<GeneratedImage> = studio.images().to_vec();
        let copies_before: Vec<AdCopy> = studio.ad_copies().to_vec();
        let target = before[1].id.clone();

        studio.regenerate_image(&target, "on a wooden table").await.unwrap();

        let after = studio.images();
        assert_eq!(after.len(), 3);
        assert_eq!(after[0], before[0]);
        assert_eq!(after[2], before[2]);
        assert_eq!(after[1].id, target);
        assert_ne!(after[1].rendered_src, before[1].rendered_src);
        assert_eq!(studio.ad_copies(), copies_before);
        assert_eq!(studio.credits(), 10 - 3 - 1);
    }

    #[tokio::test]
    async fn regenerate_rejects_blank_prompts_and_unknown_targets() {
        let backend = Arc::new(ScriptedBackend {
            images_per_run: 1,
            ad_copies_per_run: 1,
            ..Default::default()
        });
        let mut studio = ready_studio(backend.clone(), 10);
        studio.generate().await.unwrap();
        let calls_after_generate = backend.call_count();

        let id = studio.images()[0].id.clone();
        assert_matches!(
            studio.regenerate_image(&id, "   ").await,
            Err(StudioError::EmptyPrompt)
        );
        assert_matches!(
            studio.regenerate_image("nope", "wooden table").await,
            Err(StudioError::UnknownImage(_))
        );
        assert_eq!(backend.call_count(), calls_after_generate);
    }

    #[tokio::test]
    async fn upload_resets_generated_results_but_keeps_history() {
        let backend = Arc::new(ScriptedBackend {
            images_per_run: 2,
            ad_copies_per_run: 2,
            ..Default::default()
        });
        let mut studio = ready_studio(backend.clone(), 10);
        studio.generate().await.unwrap();
        assert_eq!(studio.images().len(), 2);

        studio.upload_image("next.png", &upload_bytes()).unwrap();
        assert!(studio.images().is_empty());
        assert!(studio.ad_copies().is_empty());
        assert_eq!(studio.history().len(), 1);
    }

    #[tokio::test]
    async fn logout_wipes_history_and_zeroes_the_balance() {
        let backend = Arc::new(ScriptedBackend {
            images_per_run: 1,
            ad_copies_per_run: 1,
            ..Default::default()
        });
        let mut studio = ready_studio(backend.clone(), 20);
        for _ in 0..3 {
            studio.generate().await.unwrap();
        }
        assert_eq!(studio.history().len(), 3);

        studio.logout();
        assert!(studio.history().is_empty());
        assert!(studio.images().is_empty());
        assert_eq!(studio.credits(), 0);
        assert!(studio.user().is_none());
    }

    #[tokio::test]
    async fn login_resets_the_ledger_to_the_configured_grant() {
        let backend = Arc::new(ScriptedBackend::default());
        let mut studio = studio_with(
            backend,
            Arc::new(ScriptedVerifier::approving()),
            admin_with(15, 0),
        );
        studio.login("ada@example.com");
        assert_eq!(studio.credits(), 15);

        let intent = studio.begin_checkout("starter", Gateway::Paystack).unwrap();
        studio.confirm_purchase(&intent.reference).await.unwrap();
        assert_eq!(studio.credits(), 65);

        // A fresh login discards the purchased balance.
        studio.login("ada@example.com");
        assert_eq!(studio.credits(), 15);
    }

    #[tokio::test]
    async fn auto_clear_respects_the_arming_epoch() {
        let backend = Arc::new(ScriptedBackend {
            images_per_run: 1,
            ad_copies_per_run: 1,
            ..Default::default()
        });
        let mut studio = studio_with(
            backend.clone(),
            Arc::new(ScriptedVerifier::approving()),
            admin_with(20, 2),
        );
        studio.login("ada@example.com");
        studio.upload_image("product.png", &upload_bytes()).unwrap();

        let first = studio.generate().await.unwrap();
        let first_clear = first.auto_clear.unwrap();
        assert_eq!(first_clear.after, Duration::from_secs(7200));

        let second = studio.generate().await.unwrap();
        let second_clear = second.auto_clear.unwrap();
        assert_ne!(first_clear.epoch, second_clear.epoch);

        // The superseded timer does nothing.
        studio.clear_generated(first_clear.epoch);
        assert_eq!(studio.images().len(), 1);

        // The current one clears the result set.
        studio.clear_generated(second_clear.epoch);
        assert!(studio.images().is_empty());
        assert!(studio.ad_copies().is_empty());
    }

    #[tokio::test]
    async fn unverified_purchases_never_credit_the_ledger() {
        let backend = Arc::new(ScriptedBackend::default());
        let verifier = Arc::new(ScriptedVerifier::rejecting());
        let mut studio = studio_with(backend, verifier.clone(), admin_with(10, 0));
        studio.login("ada@example.com");

        let intent = studio.begin_checkout("basic", Gateway::Paystack).unwrap();
        let err = studio.confirm_purchase(&intent.reference).await.unwrap_err();
        assert_matches!(err, StudioError::Payment(PaymentError::Unverified(_)));
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 1);
        assert_eq!(studio.credits(), 10);

        // The reference stays pending, so a later retry can still succeed.
        assert_matches!(
            studio.confirm_purchase("unknown-ref").await,
            Err(StudioError::Payment(PaymentError::UnknownReference))
        );
    }

    #[tokio::test]
    async fn cancelled_checkout_changes_nothing() {
        let backend = Arc::new(ScriptedBackend::default());
        let mut studio = studio_with(
            backend,
            Arc::new(ScriptedVerifier::approving()),
            admin_with(10, 0),
        );
        studio.login("ada@example.com");

        let intent = studio.begin_checkout("pro", Gateway::Paystack).unwrap();
        studio.cancel_checkout(&intent.reference);
        assert_eq!(studio.credits(), 10);
        assert_matches!(
            studio.confirm_purchase(&intent.reference).await,
            Err(StudioError::Payment(PaymentError::UnknownReference))
        );
    }

    #[tokio::test]
    async fn rejected_uploads_do_not_disturb_state() {
        let backend = Arc::new(ScriptedBackend {
            images_per_run: 1,
            ad_copies_per_run: 1,
            ..Default::default()
        });
        let mut studio = ready_studio(backend, 5);
        studio.generate().await.unwrap();

        assert_matches!(
            studio.upload_image("notes.txt", b"plain text"),
            Err(StudioError::UnsupportedUpload)
        );
        assert_eq!(studio.images().len(), 1);
    }
}
