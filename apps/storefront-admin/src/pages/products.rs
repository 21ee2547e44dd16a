use std::ops::Deref;
use std::sync::Arc;

use dashboard_core::mutation::{Change, OptimisticMutator};
use dashboard_core::validation::ProductForm;
use dashboard_core::{ControllerError, ControllerResult};
use notice_bus::Notice;
use storefront_sdk::records::ProductDraft;
use storefront_sdk::storage::{ImageUpload, ObjectStore};
use storefront_sdk::{Product, Record};
use tracing::warn;

use super::{failure_notice, ListPage};
use crate::state::AppState;

pub const TOPIC: &str = "products";

pub struct ProductsPage {
    page: ListPage<Product>,
    mutator: OptimisticMutator<Product>,
    images: Arc<dyn ObjectStore>,
}

impl ProductsPage {
    pub fn mount(state: &AppState) -> Self {
        let page = ListPage::mount(state.products(), state.notices(), TOPIC, state.search_debounce());
        let mutator = OptimisticMutator::new(page.list().clone(), page.sink(), TOPIC);
        Self {
            page,
            mutator,
            images: state.images(),
        }
    }

    /// Prefilled form for the edit dialog.
    pub fn edit_form(&self, product_id: &str) -> Option<ProductForm> {
        self.page.list().find(product_id).map(|p| ProductForm::from_product(&p))
    }

    /// Creates a product and shows it at the top of the list.
    pub async fn create(&self, form: &ProductForm, image: Option<ImageUpload>) -> ControllerResult<Product> {
        let mut draft = self.validated(form)?;
        let uploaded = self.upload(image).await?;
        if let Some(url) = &uploaded {
            draft.image_url = url.clone();
        }

        match self.page.list().gateway().create_record(&draft).await {
            Ok(product) => {
                self.page.list().prepend(product.clone());
                self.notify(Notice::success("Product created successfully!").for_record(product.id.clone()));
                Ok(product)
            }
            Err(err) => {
                self.discard_image(uploaded.as_deref()).await;
                let err = ControllerError::from(err);
                self.notify(failure_notice(&err, "Failed to create product"));
                Err(err)
            }
        }
    }

    /// Applies the form to an existing product. A replaced image is removed
    /// from storage once the store confirms the change.
    pub async fn update(
        &self,
        product_id: &str,
        form: &ProductForm,
        image: Option<ImageUpload>,
    ) -> ControllerResult<Product> {
        let current = self.find(product_id)?;
        let mut draft = self.validated(form)?;
        let uploaded = self.upload(image).await?;
        if let Some(url) = &uploaded {
            draft.image_url = url.clone();
        }

        let tentative = current.with_draft(&draft);
        let gateway = self.page.list().gateway();
        let result = self
            .mutator
            .mutate(
                product_id,
                Change::Replace(tentative.clone()),
                "Product updated successfully!",
                async move { gateway.update_record(product_id, &draft).await },
            )
            .await;

        match result {
            Ok(persisted) => {
                let product = match persisted {
                    Some(product) => {
                        self.page.list().replace(product.clone());
                        product
                    }
                    None => tentative,
                };
                if uploaded.is_some() && current.image_url != product.image_url {
                    self.discard_image(Some(&current.image_url)).await;
                }
                Ok(product)
            }
            Err(err) => {
                self.discard_image(uploaded.as_deref()).await;
                Err(err)
            }
        }
    }

    pub async fn delete(&self, product_id: &str) -> ControllerResult<()> {
        let current = self.find(product_id)?;
        let gateway = self.page.list().gateway();
        self.mutator
            .mutate(
                product_id,
                Change::Remove,
                "Product deleted successfully!",
                async move { gateway.delete_record(product_id).await },
            )
            .await?;
        self.discard_image(Some(&current.image_url)).await;
        Ok(())
    }

    fn find(&self, product_id: &str) -> ControllerResult<Product> {
        self.page
            .list()
            .find(product_id)
            .ok_or_else(|| ControllerError::UnknownRecord {
                kind: Product::KIND,
                id: product_id.to_string(),
            })
    }

    fn validated(&self, form: &ProductForm) -> ControllerResult<ProductDraft> {
        form.validate().map_err(|err| {
            self.notify(Notice::error(err.to_string()));
            ControllerError::from(err)
        })
    }

    async fn upload(&self, image: Option<ImageUpload>) -> ControllerResult<Option<String>> {
        let Some(image) = image else {
            return Ok(None);
        };
        match self.images.upload(image).await {
            Ok(url) => Ok(Some(url)),
            Err(err) => {
                let err = ControllerError::from(err);
                self.notify(failure_notice(&err, "Image upload failed"));
                Err(err)
            }
        }
    }

    /// Best-effort removal of an image nothing refers to any more.
    async fn discard_image(&self, url: Option<&str>) {
        let Some(url) = url.filter(|u| !u.is_empty()) else {
            return;
        };
        if let Err(err) = self.images.delete_by_url(url).await {
            warn!(topic = TOPIC, %url, error = %err, "failed to delete product image");
        }
    }

    fn notify(&self, notice: Notice) {
        self.page.sink().publish(TOPIC, notice);
    }
}

impl Deref for ProductsPage {
    type Target = ListPage<Product>;

    fn deref(&self) -> &Self::Target {
        &self.page
    }
}
