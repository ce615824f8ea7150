//! PDF invoices for placed orders.
//!
//! Invoices are plain A4 pages set in Helvetica: a heading, one line per
//! item and the order total. Long orders continue onto further pages.

use std::path::{Path, PathBuf};

use pdf_writer::{Content, Finish, Name, Pdf, Rect, Ref, Str};
use thiserror::Error;

use emporium_core::{Order, OrderId};

/// Errors from storing invoices.
#[derive(Debug, Error)]
pub enum InvoiceError {
    /// Writing the invoice file failed.
    #[error("failed to write invoice: {0}")]
    Io(#[from] std::io::Error),
}

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;
const LINE_HEIGHT: f32 = 18.0;
const LINES_PER_PAGE: usize = 40;

const CATALOG_ID: Ref = Ref::new(1);
const PAGE_TREE_ID: Ref = Ref::new(2);
const FONT_ID: Ref = Ref::new(3);
const FONT_NAME: Name<'static> = Name(b"F1");

/// File name used for an order's invoice.
#[must_use]
pub fn invoice_file_name(order_id: OrderId) -> String {
    format!("invoice-{order_id}.pdf")
}

/// Render an order as a PDF document.
#[must_use]
pub fn render_invoice(order: &Order) -> Vec<u8> {
    let lines = invoice_lines(order);
    let pages: Vec<&[String]> = lines.chunks(LINES_PER_PAGE).collect();

    let mut pdf = Pdf::new();
    pdf.catalog(CATALOG_ID).pages(PAGE_TREE_ID);

    // Page i uses object 4 + 2i, its content stream 5 + 2i
    let page_ids: Vec<Ref> = (0..pages.len()).map(|i| object_ref(4 + 2 * i)).collect();
    pdf.pages(PAGE_TREE_ID)
        .kids(page_ids.iter().copied())
        .count(i32::try_from(page_ids.len()).unwrap_or(i32::MAX));

    for (i, page_lines) in pages.iter().enumerate() {
        let page_id = object_ref(4 + 2 * i);
        let content_id = object_ref(5 + 2 * i);

        let mut page = pdf.page(page_id);
        page.media_box(Rect::new(0.0, 0.0, PAGE_WIDTH, PAGE_HEIGHT));
        page.parent(PAGE_TREE_ID);
        page.contents(content_id);
        page.resources().fonts().pair(FONT_NAME, FONT_ID);
        page.finish();

        let mut content = Content::new();
        content.begin_text();
        content.set_font(FONT_NAME, 12.0);
        content.next_line(MARGIN, PAGE_HEIGHT - MARGIN);
        for (n, line) in page_lines.iter().enumerate() {
            if n > 0 {
                content.next_line(0.0, -LINE_HEIGHT);
            }
            content.show(Str(line.as_bytes()));
        }
        content.end_text();
        pdf.stream(content_id, &content.finish());
    }

    pdf.type1_font(FONT_ID).base_font(Name(b"Helvetica"));

    pdf.finish()
}

/// Write a rendered invoice to `dir`, returning its path.
///
/// # Errors
///
/// Returns `InvoiceError::Io` if the directory or file cannot be written.
pub async fn save_invoice(dir: &Path, order_id: OrderId, pdf: &[u8]) -> Result<PathBuf, InvoiceError> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(invoice_file_name(order_id));
    tokio::fs::write(&path, pdf).await?;
    Ok(path)
}

fn object_ref(n: usize) -> Ref {
    Ref::new(i32::try_from(n).unwrap_or(i32::MAX))
}

/// The text lines of an invoice, in order.
fn invoice_lines(order: &Order) -> Vec<String> {
    let mut lines = vec![
        "Invoice".to_string(),
        format!("Order #{}", order.id),
        format!("Customer: {}", pdf_text(&order.user_name)),
        format!("Date: {}", order.created_at.format("%Y-%m-%d")),
        "-----------------------".to_string(),
    ];

    for item in &order.items {
        lines.push(format!(
            "{} - {} x {}",
            pdf_text(&item.product.title),
            item.quantity,
            item.product.price
        ));
    }

    lines.push("-----------------------".to_string());
    lines.push(format!("Total Price: {:.2}", order.total_price));
    lines
}

/// Replace characters the standard Helvetica encoding cannot show.
fn pdf_text(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '?' })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::num::NonZeroU32;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use emporium_core::{OrderItem, Price, ProductId, ProductSnapshot, UserId};

    use super::*;

    fn item(id: i32, title: &str, price: &str, quantity: u32) -> OrderItem {
        OrderItem {
            product: ProductSnapshot {
                id: ProductId::new(id),
                title: title.to_string(),
                price: Price::parse(price).unwrap(),
                description: "A thing".to_string(),
                image_path: "x.png".to_string(),
            },
            quantity: NonZeroU32::new(quantity).unwrap(),
        }
    }

    fn order(items: Vec<OrderItem>) -> Order {
        Order {
            id: OrderId::new(42),
            user_id: UserId::new(1),
            user_name: "Ada".to_string(),
            total_price: items.iter().map(OrderItem::line_total).sum::<Decimal>(),
            items,
            checkout_session_id: None,
            created_at: Utc::now(),
        }
    }

    fn contains(haystack: &[u8], needle: &str) -> bool {
        haystack
            .windows(needle.len())
            .any(|w| w == needle.as_bytes())
    }

    #[test]
    fn test_invoice_is_pdf_with_item_titles() {
        let pdf = render_invoice(&order(vec![
            item(1, "Brass Lamp", "10", 2),
            item(2, "Wool Rug", "5", 1),
        ]));

        assert!(pdf.starts_with(b"%PDF"));
        assert!(contains(&pdf, "Brass Lamp - 2 x 10.00"));
        assert!(contains(&pdf, "Wool Rug - 1 x 5.00"));
        assert!(contains(&pdf, "Total Price: 25.00"));
    }

    #[test]
    fn test_long_orders_span_pages() {
        let items = (1..=60).map(|i| item(i, "Widget", "1", 1)).collect();
        let lines = invoice_lines(&order(items));
        assert!(lines.len() > LINES_PER_PAGE);

        let pdf = render_invoice(&order((1..=60).map(|i| item(i, "Widget", "1", 1)).collect()));
        assert!(contains(&pdf, "/Count 2"));
    }

    #[test]
    fn test_non_ascii_is_replaced() {
        assert_eq!(pdf_text("Caf\u{e9}"), "Caf?");
    }

    #[test]
    fn test_invoice_file_name() {
        assert_eq!(invoice_file_name(OrderId::new(7)), "invoice-7.pdf");
    }
}
