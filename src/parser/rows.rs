use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use super::columns::ColumnMap;

static TR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static TH: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th").unwrap());
static TD: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").unwrap());

const DATA_IMAGE_PREFIX: &str = "data:image";

/// Shape of one `<tr>` on the results page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Row {
    /// One `<th>` + one `<td>`: a student attribute such as `Name`.
    Attribute { key: String, value: String },
    /// One `<th>` + at least `min_cells` `<td>`s: a subject line.
    Subject { code: String, cells: Vec<String> },
    /// The subject table's own header row (`Paper | External | ...`).
    ColumnTitles,
    Other,
}

/// Classify every table row of the page, in document order.
/// Markup that is not a table at all simply yields no rows.
pub fn classify_rows(doc: &Html, columns: &ColumnMap) -> Vec<Row> {
    doc.select(&TR).map(|tr| classify_row(tr, columns)).collect()
}

fn classify_row(tr: ElementRef<'_>, columns: &ColumnMap) -> Row {
    let ths: Vec<String> = tr.select(&TH).map(cell_text).collect();
    if ths.len() != 1 {
        return Row::Other;
    }
    let tds: Vec<String> = tr.select(&TD).map(cell_text).collect();
    let header = ths.into_iter().next().unwrap_or_default();

    if tds.len() == 1 {
        return Row::Attribute {
            key: header,
            value: tds.into_iter().next().unwrap_or_default(),
        };
    }
    if tds.len() >= columns.min_cells {
        if header == columns.header_label {
            return Row::ColumnTitles;
        }
        return Row::Subject {
            code: header,
            cells: tds,
        };
    }
    Row::Other
}

fn cell_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// `src` of the first `<img alt="{photo_alt}">`, kept only when it is an
/// inline data URI.
pub fn find_photo(doc: &Html, columns: &ColumnMap) -> Option<String> {
    let img = doc
        .select(&IMG)
        .find(|img| img.value().attr("alt") == Some(columns.photo_alt.as_str()))?;
    img.value()
        .attr("src")
        .filter(|src| src.starts_with(DATA_IMAGE_PREFIX))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(html: &str) -> Vec<Row> {
        classify_rows(&Html::parse_document(html), &ColumnMap::default())
    }

    #[test]
    fn attribute_row() {
        let r = rows("<table><tr><th> Name </th><td>\n  RAVI KUMAR </td></tr></table>");
        assert_eq!(
            r,
            vec![Row::Attribute {
                key: "Name".into(),
                value: "RAVI KUMAR".into()
            }]
        );
    }

    #[test]
    fn subject_row_keeps_all_cells() {
        let r = rows(
            "<table><tr><th>301</th><td>40</td><td>18</td><td>58</td><td>x</td><td>y</td><td>B</td><td>P</td><td>extra</td></tr></table>",
        );
        match &r[0] {
            Row::Subject { code, cells } => {
                assert_eq!(code, "301");
                assert_eq!(cells.len(), 8);
                assert_eq!(cells[6], "P");
            }
            other => panic!("expected subject row, got {:?}", other),
        }
    }

    #[test]
    fn paper_header_is_column_titles() {
        let r = rows(
            "<table><tr><th>Paper</th><td>Ext</td><td>Int</td><td>Tot</td><td>a</td><td>b</td><td>Grade</td><td>Status</td></tr></table>",
        );
        assert_eq!(r, vec![Row::ColumnTitles]);
    }

    #[test]
    fn other_shapes_ignored() {
        let r = rows(concat!(
            "<table>",
            "<tr><th>a</th><th>b</th><td>1</td></tr>",
            "<tr><td>no header</td></tr>",
            "<tr><th>Short</th><td>1</td><td>2</td><td>3</td></tr>",
            "<tr><th>Empty</th></tr>",
            "</table>"
        ));
        assert!(r.iter().all(|row| *row == Row::Other));
        assert_eq!(r.len(), 4);
    }

    #[test]
    fn not_markup_yields_nothing() {
        assert!(rows("").is_empty());
        assert!(rows("{\"error\": \"maintenance\"}").is_empty());
        assert!(rows("<<<>>> not html at all").is_empty());
    }

    #[test]
    fn photo_data_uri() {
        let doc = Html::parse_document(
            r#"<img alt="logo" src="data:image/png;base64,AAA"><img alt="NO FILE" src="data:image/jpeg;base64,/9j/4AAQ">"#,
        );
        assert_eq!(
            find_photo(&doc, &ColumnMap::default()).as_deref(),
            Some("data:image/jpeg;base64,/9j/4AAQ")
        );
    }

    #[test]
    fn photo_plain_url_dropped() {
        let doc = Html::parse_document(r#"<img alt="NO FILE" src="/photos/123.jpg">"#);
        assert_eq!(find_photo(&doc, &ColumnMap::default()), None);
        let doc = Html::parse_document(r#"<img alt="NO FILE">"#);
        assert_eq!(find_photo(&doc, &ColumnMap::default()), None);
        let doc = Html::parse_document("<p>no image</p>");
        assert_eq!(find_photo(&doc, &ColumnMap::default()), None);
    }
}
