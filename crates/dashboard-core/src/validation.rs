use std::fmt;
use std::str::FromStr;

use storefront_sdk::records::{Dimensions, ProductDraft};
use storefront_sdk::Product;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("product name is required")]
    MissingName,
    #[error("price {0:?} is not a number")]
    InvalidPrice(String),
    #[error("price cannot be negative")]
    NegativePrice,
    #[error("stock quantity {0:?} is not a whole number")]
    InvalidStock(String),
    #[error("unknown category {0:?}")]
    UnknownCategory(String),
    #[error("{field} {value:?} is not a number")]
    InvalidDimension { field: &'static str, value: String },
    #[error("email is required")]
    MissingEmail,
    #[error("{0:?} is not an email address")]
    InvalidEmail(String),
    #[error("password is required")]
    MissingPassword,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Category {
    #[default]
    Foods,
    Beverages,
    Seasonings,
    Others,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Foods,
        Category::Beverages,
        Category::Seasonings,
        Category::Others,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Foods => "Foods",
            Category::Beverages => "Beverages",
            Category::Seasonings => "Seasonings",
            Category::Others => "Others",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Category::default());
        }
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ValidationError::UnknownCategory(trimmed.to_string()))
    }
}

/// Raw product form input, as typed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductForm {
    pub name: String,
    pub description: String,
    /// Dollars, e.g. `"12.50"`.
    pub price: String,
    pub category: String,
    pub stock_quantity: String,
    pub size: String,
    pub weight: String,
    pub height: String,
    pub width: String,
    pub length: String,
    /// Current image, kept unless a new one is uploaded.
    pub image_url: String,
}

impl ProductForm {
    /// Prefills the form for editing `product`.
    pub fn from_product(product: &Product) -> Self {
        let number = |v: Option<f64>| v.map(|n| n.to_string()).unwrap_or_default();
        Self {
            name: product.name.clone(),
            description: product.description.clone(),
            price: format!("{}.{:02}", product.price / 100, product.price % 100),
            category: product.category.clone(),
            stock_quantity: product.stock_quantity.to_string(),
            size: product.dimensions.size.clone().unwrap_or_default(),
            weight: number(product.dimensions.weight),
            height: number(product.dimensions.height),
            width: number(product.dimensions.width),
            length: number(product.dimensions.length),
            image_url: product.image_url.clone(),
        }
    }

    pub fn validate(&self) -> Result<ProductDraft, ValidationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::MissingName);
        }
        let price = parse_cents(&self.price)?;
        let category = self.category.parse::<Category>()?;
        let stock = self.stock_quantity.trim();
        let stock_quantity = if stock.is_empty() {
            0
        } else {
            stock
                .parse::<u32>()
                .map_err(|_| ValidationError::InvalidStock(stock.to_string()))?
        };
        let size = self.size.trim();

        Ok(ProductDraft {
            name: name.to_string(),
            description: self.description.trim().to_string(),
            price,
            image_url: self.image_url.clone(),
            category: category.as_str().to_string(),
            stock_quantity,
            dimensions: Dimensions {
                size: (!size.is_empty()).then(|| size.to_string()),
                weight: parse_dimension("weight", &self.weight)?,
                height: parse_dimension("height", &self.height)?,
                width: parse_dimension("width", &self.width)?,
                length: parse_dimension("length", &self.length)?,
            },
        })
    }
}

/// Largest price the form accepts, in dollars.
const MAX_PRICE_DOLLARS: f64 = 1_000_000_000.0;

/// Parses a dollar amount into cents, rounding to the nearest cent.
fn parse_cents(input: &str) -> Result<u64, ValidationError> {
    let trimmed = input.trim().trim_start_matches('$');
    let dollars: f64 = trimmed
        .parse()
        .map_err(|_| ValidationError::InvalidPrice(input.trim().to_string()))?;
    if !dollars.is_finite() || dollars > MAX_PRICE_DOLLARS {
        return Err(ValidationError::InvalidPrice(input.trim().to_string()));
    }
    if dollars < 0.0 {
        return Err(ValidationError::NegativePrice);
    }
    Ok((dollars * 100.0).round() as u64)
}

fn parse_dimension(field: &'static str, input: &str) -> Result<Option<f64>, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .map(Some)
        .ok_or_else(|| ValidationError::InvalidDimension {
            field,
            value: trimmed.to_string(),
        })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

impl LoginForm {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Returns the trimmed email and the password untouched.
    pub fn validate(&self) -> Result<(String, String), ValidationError> {
        let email = self.email.trim();
        if email.is_empty() {
            return Err(ValidationError::MissingEmail);
        }
        let well_formed = email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.'));
        if !well_formed {
            return Err(ValidationError::InvalidEmail(email.to_string()));
        }
        if self.password.is_empty() {
            return Err(ValidationError::MissingPassword);
        }
        Ok((email.to_string(), self.password.clone()))
    }
}

#[cfg(test)]
mod tests {
    use storefront_sdk::Record;

    use super::*;

    fn form(name: &str, price: &str) -> ProductForm {
        ProductForm {
            name: name.into(),
            price: price.into(),
            ..ProductForm::default()
        }
    }

    #[test]
    fn prices_are_entered_in_dollars_and_stored_in_cents() {
        assert_eq!(form("Tea", "12.5").validate().unwrap().price, 1250);
        assert_eq!(form("Tea", "$0.29").validate().unwrap().price, 29);
        assert_eq!(form("Tea", "3").validate().unwrap().price, 300);
    }

    #[test]
    fn rejects_bad_input_before_submission() {
        assert_eq!(form("  ", "1").validate(), Err(ValidationError::MissingName));
        assert_eq!(
            form("Tea", "abc").validate(),
            Err(ValidationError::InvalidPrice("abc".into()))
        );
        assert_eq!(form("Tea", "-1").validate(), Err(ValidationError::NegativePrice));
        assert_eq!(
            form("Tea", "1e30").validate(),
            Err(ValidationError::InvalidPrice("1e30".into()))
        );
        assert_eq!(form("Tea", "1000000000").validate().unwrap().price, 100_000_000_000);

        let mut bad_stock = form("Tea", "1");
        bad_stock.stock_quantity = "2.5".into();
        assert_eq!(bad_stock.validate(), Err(ValidationError::InvalidStock("2.5".into())));

        let mut bad_category = form("Tea", "1");
        bad_category.category = "Toys".into();
        assert_eq!(
            bad_category.validate(),
            Err(ValidationError::UnknownCategory("Toys".into()))
        );
    }

    #[test]
    fn category_defaults_to_foods() {
        let draft = form("Rice", "1").validate().unwrap();
        assert_eq!(draft.category, "Foods");
        assert_eq!("beverages".parse::<Category>(), Ok(Category::Beverages));
    }

    #[test]
    fn edit_form_round_trips_a_product() {
        let product = Product {
            id: "p1".into(),
            name: "Sambal".into(),
            price: 1999,
            category: "Seasonings".into(),
            stock_quantity: 4,
            dimensions: Dimensions {
                weight: Some(0.25),
                ..Dimensions::default()
            },
            ..Product::default()
        };
        let draft = ProductForm::from_product(&product).validate().unwrap();
        assert_eq!(draft.price, 1999);
        assert_eq!(draft.category, "Seasonings");
        assert_eq!(draft.stock_quantity, 4);
        assert_eq!(draft.dimensions.weight, Some(0.25));
        assert_eq!(product.with_draft(&draft), product);
    }

    #[test]
    fn login_requires_email_and_password() {
        assert_eq!(LoginForm::new("", "x").validate(), Err(ValidationError::MissingEmail));
        assert_eq!(
            LoginForm::new("admin", "x").validate(),
            Err(ValidationError::InvalidEmail("admin".into()))
        );
        assert_eq!(
            LoginForm::new("admin@shop.test", "").validate(),
            Err(ValidationError::MissingPassword)
        );
        assert_eq!(
            LoginForm::new(" admin@shop.test ", "pw").validate(),
            Ok(("admin@shop.test".into(), "pw".into()))
        );
    }
}
