//! Stateless transforms from storefront markup to typed records.
//!
//! The storefront is inconsistent about what it renders, so absence is never
//! an error here: a missing menu yields no categories, a missing pagination
//! control yields a single page, and malformed prices read as zero.

pub mod price;

use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use crate::error::ParseError;
use crate::models::{Category, PaginationInfo, Product};

pub use price::parse_price_text;
use price::parse_ecommerce_data;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("hardcoded CSS selector is valid")
}

static MENU_TOP: LazyLock<Selector> = LazyLock::new(|| selector("ul.catalog_menu > li"));
static MENU_SECOND: LazyLock<Selector> =
    LazyLock::new(|| selector("ul.catalog_menu_sub_second > li"));
static MENU_THIRD: LazyLock<Selector> = LazyLock::new(|| selector("ul.catalog_menu_sub_third"));
static MENU_THIRD_LINK: LazyLock<Selector> = LazyLock::new(|| selector("li > a"));
static MENU_SECOND_LINK: LazyLock<Selector> =
    LazyLock::new(|| selector("div.bli_pos_second > a"));

static PRODUCT_CARD: LazyLock<Selector> =
    LazyLock::new(|| selector("div.wrap_list_prod div.blocks_product"));
static FAVORITE_BUTTON: LazyLock<Selector> =
    LazyLock::new(|| selector("button.favorite_product"));
static CARD_LINK: LazyLock<Selector> = LazyLock::new(|| selector("div.blocks_product_fix_w > a"));
static CARD_IMAGE: LazyLock<Selector> = LazyLock::new(|| selector("img"));
static CARD_TITLE: LazyLock<Selector> = LazyLock::new(|| selector("h2.bp_text_info a"));
static CARD_PRICE: LazyLock<Selector> = LazyLock::new(|| selector("p.bp_text_price"));

static PAGINATION: LazyLock<Selector> =
    LazyLock::new(|| selector("div.pagination_catalog ul.pagination"));
static PAGINATION_ACTIVE: LazyLock<Selector> = LazyLock::new(|| selector("a.active"));
static PAGINATION_LINK: LazyLock<Selector> = LazyLock::new(|| selector("li > a"));

static TOTAL_PRODUCTS: LazyLock<Selector> =
    LazyLock::new(|| selector("div.search_all_produkt span"));

static DESCRIPTION_CANDIDATES: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        "div.detail_text",
        "div#detail_text",
        "div[itemprop='description']",
        "div.product-detail-text",
        "div.product_description",
        "div.element-detail-text",
    ]
    .into_iter()
    .map(selector)
    .collect()
});

/// Collapses every whitespace run to a single space and trims the ends.
pub fn normalize_space(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(element: ElementRef<'_>) -> String {
    normalize_space(&element.text().collect::<String>())
}

/// Parses the three-level navigation menu into leaf categories.
///
/// Second-level entries with a third-level list contribute each of its links;
/// entries without one are leaves themselves. Links are emitted in document
/// order, deduplicated by URL with the first occurrence winning.
pub fn parse_categories(html: &str) -> Vec<Category> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut categories = Vec::new();

    for top in document.select(&MENU_TOP) {
        for second in top.select(&MENU_SECOND) {
            if let Some(third) = second.select(&MENU_THIRD).next() {
                for link in third.select(&MENU_THIRD_LINK) {
                    push_category(&mut categories, &mut seen, link);
                }
            } else if let Some(link) = second.select(&MENU_SECOND_LINK).next() {
                push_category(&mut categories, &mut seen, link);
            }
        }
    }

    categories
}

fn push_category(categories: &mut Vec<Category>, seen: &mut HashSet<String>, link: ElementRef<'_>) {
    let href = link.value().attr("href").unwrap_or_default().trim();
    let name = element_text(link);

    if href.is_empty() || href == "#" || name.is_empty() {
        return;
    }
    if !seen.insert(href.to_string()) {
        return;
    }

    categories.push(Category::new(name, href));
}

/// Parses the product cards of a category listing page.
///
/// Cards without a link, a name or a product URL are skipped. The displayed
/// price wins; the price carried by the link's ecommerce payload is used only
/// when the displayed one reads as zero.
pub fn parse_products(html: &str) -> Vec<Product> {
    let document = Html::parse_document(html);

    document
        .select(&PRODUCT_CARD)
        .filter_map(parse_product_card)
        .collect()
}

fn parse_product_card(card: ElementRef<'_>) -> Option<Product> {
    let mut product = Product::default();

    if let Some(button) = card.select(&FAVORITE_BUTTON).next() {
        product.external_id = button.value().attr("data-elid").unwrap_or_default().to_string();
    }

    let link = card.select(&CARD_LINK).next()?;
    product.product_url = link.value().attr("href").unwrap_or_default().trim().to_string();

    if let Some(image) = link.select(&CARD_IMAGE).next() {
        product.image_url = image.value().attr("src").unwrap_or_default().to_string();
        product.name = normalize_space(image.value().attr("title").unwrap_or_default());
    }

    if let Some(title) = card.select(&CARD_TITLE).next() {
        let text = element_text(title);
        if !text.is_empty() {
            product.name = text;
        }
    }

    if let Some(price) = card.select(&CARD_PRICE).next() {
        product.price = parse_price_text(&price.text().collect::<String>());
    }

    if let Some(data) = link.value().attr("onclick").and_then(parse_ecommerce_data) {
        product.sku = data.id;
        product.brand = data.brand;
        product.category_label = data.category;
        if product.price == 0 {
            product.price = data.price;
        }
    }

    if product.name.is_empty() || product.product_url.is_empty() {
        return None;
    }

    Some(product)
}

/// Reads the first pagination control, defaulting to a single page.
pub fn parse_pagination(html: &str) -> PaginationInfo {
    let document = Html::parse_document(html);
    let mut info = PaginationInfo::default();

    let Some(control) = document.select(&PAGINATION).next() else {
        return info;
    };

    if let Some(active) = control.select(&PAGINATION_ACTIVE).next()
        && let Ok(page) = element_text(active).parse::<u32>()
    {
        info.current_page = page.max(1);
    }

    info.total_pages = control
        .select(&PAGINATION_LINK)
        .map(element_text)
        .filter(|text| !text.is_empty() && text != "...")
        .filter_map(|text| text.parse::<u32>().ok())
        .fold(info.current_page, u32::max);

    info
}

/// Reads the "N products found" counter of a listing page.
///
/// Returns `0` when the counter is missing or empty.
///
/// # Errors
///
/// Returns [`ParseError::InvalidCount`] if the counter holds something other
/// than digits and thousands separators.
pub fn parse_total_products(html: &str) -> Result<u64, ParseError> {
    let document = Html::parse_document(html);

    let Some(counter) = document.select(&TOTAL_PRODUCTS).next() else {
        return Ok(0);
    };

    let text = element_text(counter);
    if text.is_empty() {
        return Ok(0);
    }

    let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    digits
        .parse()
        .map_err(|error| ParseError::InvalidCount { text, error })
}

/// Returns the text of the first non-empty description container on a
/// product detail page, or an empty string.
pub fn parse_product_description(html: &str) -> String {
    let document = Html::parse_document(html);

    DESCRIPTION_CANDIDATES
        .iter()
        .filter_map(|candidate| document.select(candidate).next())
        .map(element_text)
        .find(|text| !text.is_empty())
        .unwrap_or_default()
}
