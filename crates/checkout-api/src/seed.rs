//! Catalog seeding from `products.toml` and `coupons.toml`.

use checkout_core::{
    CheckoutError, CheckoutResult, Coupon, CouponCatalog, Logger, Product, ProductCatalog,
    RepositoryFactory,
};
use serde_json::json;
use std::path::{Path, PathBuf};

const CONFIG_DIRS: [&str; 3] = ["config", "../config", "../../config"];

/// Both seed files; either may be absent
#[derive(Debug, Clone, Default)]
pub struct Catalogs {
    pub products: ProductCatalog,
    pub coupons: CouponCatalog,
}

/// First candidate directory that contains a `products.toml`
pub fn locate_config_dir() -> Option<PathBuf> {
    CONFIG_DIRS
        .iter()
        .map(PathBuf::from)
        .find(|dir| dir.join("products.toml").is_file())
}

/// Read and parse the seed files under `dir`. A missing file yields an empty
/// catalog; a malformed one is a configuration error.
pub fn load_catalogs(dir: &Path) -> CheckoutResult<Catalogs> {
    let products = match read_optional(&dir.join("products.toml"))? {
        Some((path, content)) => ProductCatalog::from_toml(&content).map_err(|e| {
            CheckoutError::Configuration(format!("Failed to parse {}: {}", path.display(), e))
        })?,
        None => {
            tracing::warn!("No product catalog found in {}, using empty catalog", dir.display());
            ProductCatalog::default()
        }
    };

    let coupons = match read_optional(&dir.join("coupons.toml"))? {
        Some((path, content)) => CouponCatalog::from_toml(&content).map_err(|e| {
            CheckoutError::Configuration(format!("Failed to parse {}: {}", path.display(), e))
        })?,
        None => CouponCatalog::default(),
    };

    Ok(Catalogs { products, coupons })
}

fn read_optional(path: &Path) -> CheckoutResult<Option<(PathBuf, String)>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some((path.to_path_buf(), content))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CheckoutError::Configuration(format!(
            "Failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Insert catalog entries that are not stored yet. Returns
/// `(products, coupons)` inserted.
pub async fn seed_repositories(
    repositories: &RepositoryFactory,
    catalogs: &Catalogs,
    logger: &Logger,
) -> CheckoutResult<(usize, usize)> {
    let products = repositories
        .repository::<Product>()
        .seed(&catalogs.products)
        .await?;
    let coupons = repositories
        .repository::<Coupon>()
        .seed(&catalogs.coupons)
        .await?;

    logger.for_component("seed").info_with(
        "catalog seeded",
        json!({
            "products": products,
            "coupons": coupons,
            "products_in_file": catalogs.products.products.len(),
            "coupons_in_file": catalogs.coupons.coupons.len(),
        }),
    );
    Ok((products, coupons))
}
