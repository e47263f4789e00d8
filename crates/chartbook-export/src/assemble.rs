//! Page planning and PDF emission.
//!
//! [`plan_pages`] decides grouping, order and which cover pages appear. It is pure, so the
//! ordering rules are testable without producing a document. [`assemble_pdf`] writes a plan
//! with `pdf-writer`.

use crate::assets::{CoverImage, ExportAssets};
use crate::error::AssemblyError;
use crate::snapshot::ChartSnapshot;
use crate::template::{CoverMapping, TemplateConfig};
use chartbook_core::NO_COVER;
use chartbook_render::raster::parse_hex_rgba;
use chartbook_render::{ImageFormat, RasterImage, compress};
use chrono::{DateTime, Datelike, Timelike, Utc};
use pdf_writer::{Content, Date, Filter, Name, Pdf, Rect, Ref, Str, TextStr};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

const FONT_REGULAR: &[u8] = b"F1";
const FONT_BOLD: &[u8] = b"F2";
/// Average Helvetica advance as a fraction of the font size, for right alignment.
const AVG_GLYPH_WIDTH: f32 = 0.52;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedPage {
    DocumentCover {
        image: Option<String>,
    },
    SectionCover {
        cover_key: String,
        image: Option<String>,
    },
    Chart {
        /// Index into the snapshot slice the plan was made from.
        snapshot: usize,
        cover_key: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PagePlan {
    pub pages: Vec<PlannedPage>,
}

impl PagePlan {
    pub fn total(&self) -> usize {
        self.pages.len()
    }

    pub fn section_covers(&self) -> usize {
        self.pages
            .iter()
            .filter(|p| matches!(p, PlannedPage::SectionCover { .. }))
            .count()
    }

    /// Snapshot indices in page order.
    pub fn chart_order(&self) -> Vec<usize> {
        self.pages
            .iter()
            .filter_map(|p| match p {
                PlannedPage::Chart { snapshot, .. } => Some(*snapshot),
                _ => None,
            })
            .collect()
    }
}

fn missing_last<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Order of charts inside one cover group.
pub fn compare_in_group(a: &ChartSnapshot, b: &ChartSnapshot) -> Ordering {
    missing_last(a.cover_order_index, b.cover_order_index)
        .then_with(|| missing_last(a.created_at, b.created_at))
        .then_with(|| a.chart_id.cmp(&b.chart_id))
}

/// Sorts group keys: listed keys by their position in `cover_order`, the rest after them by
/// key.
pub fn sort_groups(keys: &mut [&str], covers: &CoverMapping) {
    keys.sort_by(|a, b| {
        missing_last(covers.order_of(a), covers.order_of(b)).then_with(|| a.cmp(b))
    });
}

pub fn plan_pages(snapshots: &[ChartSnapshot], covers: &CoverMapping) -> PagePlan {
    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, s) in snapshots.iter().enumerate() {
        groups.entry(s.cover_key()).or_default().push(i);
    }
    let mut keys: Vec<&str> = groups.keys().copied().collect();
    sort_groups(&mut keys, covers);

    let document_image = covers.document_image();
    let mut pages = vec![PlannedPage::DocumentCover {
        image: document_image.map(str::to_string),
    }];
    for (rank, key) in keys.iter().enumerate() {
        let image = covers.image_for(key);
        let repeats_document_cover = rank == 0 && image.is_some() && image == document_image;
        if *key != NO_COVER && !repeats_document_cover {
            pages.push(PlannedPage::SectionCover {
                cover_key: key.to_string(),
                image: image.map(str::to_string),
            });
        }

        let mut members = groups.remove(key).unwrap_or_default();
        members.sort_by(|&a, &b| compare_in_group(&snapshots[a], &snapshots[b]));
        pages.extend(members.into_iter().map(|i| PlannedPage::Chart {
            snapshot: i,
            cover_key: key.to_string(),
        }));
    }
    PagePlan { pages }
}

#[derive(Debug, Clone)]
pub struct AssemblyOptions {
    /// Draw charts from their vector snapshot when one converts.
    pub vector_pages: bool,
    pub created: DateTime<Utc>,
    /// JPEG quality used when a raster has to be re-encoded for embedding.
    pub jpeg_quality: f32,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            vector_pages: true,
            created: Utc::now(),
            jpeg_quality: 0.85,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssembledDocument {
    pub bytes: Vec<u8>,
    pub page_count: usize,
    /// Chart ids in page order.
    pub chart_ids: Vec<String>,
    pub vector_pages: usize,
}

/// Encodes text for the standard fonts' WinAnsi encoding. Characters outside Latin-1 become `?`.
pub fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match u32::from(c) {
            0x20..=0x7e | 0xa0..=0xff => u32::from(c) as u8,
            0x09 | 0x0a | 0x0d => b' ',
            _ => b'?',
        })
        .collect()
}

fn rgb(hex: &str, fallback: [f32; 3]) -> [f32; 3] {
    match parse_hex_rgba(hex) {
        Some([r, g, b, _]) => [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0],
        None => {
            tracing::warn!(color = hex, "invalid palette color");
            fallback
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Colors {
    primary: [f32; 3],
    text: [f32; 3],
    muted: [f32; 3],
    band: [f32; 3],
}

#[derive(Debug, Clone, Copy)]
struct Area {
    x: f32,
    y: f32,
    w: f32,
    h: f32,
}

impl Area {
    /// Largest box with the aspect ratio of `natural_w x natural_h` that fits here, centered.
    fn fit(&self, natural_w: f32, natural_h: f32) -> Area {
        if natural_w <= 0.0 || natural_h <= 0.0 {
            return *self;
        }
        let s = (self.w / natural_w).min(self.h / natural_h);
        let (w, h) = (natural_w * s, natural_h * s);
        Area {
            x: self.x + (self.w - w) / 2.0,
            y: self.y + (self.h - h) / 2.0,
            w,
            h,
        }
    }
}

struct PdfBuilder<'a> {
    pdf: Pdf,
    alloc: Ref,
    pages_id: Ref,
    page_ids: Vec<Ref>,
    font_regular: Ref,
    font_bold: Ref,
    template: &'a TemplateConfig,
    colors: Colors,
    svg_options: Option<svg2pdf::usvg::Options<'static>>,
    cover_refs: HashMap<String, Ref>,
}

impl<'a> PdfBuilder<'a> {
    fn new(template: &'a TemplateConfig, vector: bool) -> Self {
        let mut alloc = Ref::new(1);
        let catalog_id = alloc.bump();
        let pages_id = alloc.bump();
        let font_regular = alloc.bump();
        let font_bold = alloc.bump();

        let mut pdf = Pdf::new();
        pdf.catalog(catalog_id).pages(pages_id);
        let (regular, bold) = template.fonts.resolved();
        pdf.type1_font(font_regular)
            .base_font(Name(regular.as_bytes()))
            .encoding_predefined(Name(b"WinAnsiEncoding"));
        pdf.type1_font(font_bold)
            .base_font(Name(bold.as_bytes()))
            .encoding_predefined(Name(b"WinAnsiEncoding"));

        let svg_options = vector.then(|| {
            let mut opt = svg2pdf::usvg::Options::default();
            opt.fontdb_mut().load_system_fonts();
            opt.font_family = "Arial".to_string();
            opt
        });

        let p = &template.palette;
        let colors = Colors {
            primary: rgb(&p.primary, [0.18, 0.36, 0.54]),
            text: rgb(&p.text, [0.1, 0.1, 0.1]),
            muted: rgb(&p.muted, [0.42, 0.47, 0.52]),
            band: rgb(&p.band, [0.91, 0.93, 0.96]),
        };

        Self {
            pdf,
            alloc,
            pages_id,
            page_ids: Vec::new(),
            font_regular,
            font_bold,
            template,
            colors,
            svg_options,
            cover_refs: HashMap::new(),
        }
    }

    fn text(
        &self,
        content: &mut Content,
        font: &[u8],
        size: f32,
        color: [f32; 3],
        x: f32,
        y: f32,
        text: &str,
    ) {
        let [r, g, b] = color;
        content.begin_text();
        content.set_font(Name(font), size);
        content.set_fill_rgb(r, g, b);
        content.next_line(x, y);
        content.show(Str(&win_ansi(text)));
        content.end_text();
    }

    fn text_width(size: f32, text: &str) -> f32 {
        text.chars().count() as f32 * size * AVG_GLYPH_WIDTH
    }

    fn fill_rect(content: &mut Content, color: [f32; 3], area: Area) {
        let [r, g, b] = color;
        content.save_state();
        content.set_fill_rgb(r, g, b);
        content.rect(area.x, area.y, area.w, area.h);
        content.fill_nonzero();
        content.restore_state();
    }

    fn draw_xobject(content: &mut Content, name: &str, area: Area) {
        content.save_state();
        content.transform([area.w, 0.0, 0.0, area.h, area.x, area.y]);
        content.x_object(Name(name.as_bytes()));
        content.restore_state();
    }

    fn embed_jpeg(&mut self, image: &RasterImage) -> Ref {
        let id = self.alloc.bump();
        let mut xobj = self.pdf.image_xobject(id, &image.bytes);
        xobj.filter(Filter::DctDecode);
        xobj.width(image.width as i32);
        xobj.height(image.height as i32);
        xobj.color_space().device_rgb();
        xobj.bits_per_component(8);
        id
    }

    fn embed_cover(&mut self, cover: &CoverImage) -> Ref {
        if let Some(&id) = self.cover_refs.get(&cover.path) {
            return id;
        }
        let id = self.embed_jpeg(&cover.image);
        self.cover_refs.insert(cover.path.clone(), id);
        id
    }

    /// Converts `svg` into a form XObject. `None` when conversion fails.
    fn embed_svg(&mut self, chart_id: &str, svg: &str) -> Option<Ref> {
        let opt = self.svg_options.as_ref()?;
        let tree = match svg2pdf::usvg::Tree::from_str(svg, opt) {
            Ok(tree) => tree,
            Err(err) => {
                tracing::warn!(chart = chart_id, error = %err, "vector snapshot unreadable, using raster");
                return None;
            }
        };
        let (chunk, svg_ref) =
            match svg2pdf::to_chunk(&tree, svg2pdf::ConversionOptions::default()) {
                Ok(out) => out,
                Err(err) => {
                    tracing::warn!(chart = chart_id, error = %err, "vector conversion failed, using raster");
                    return None;
                }
            };
        let mut map = HashMap::new();
        let alloc = &mut self.alloc;
        let chunk = chunk.renumber(|old| *map.entry(old).or_insert_with(|| alloc.bump()));
        let id = map.get(&svg_ref).copied()?;
        self.pdf.extend(&chunk);
        Some(id)
    }

    fn finish_page(&mut self, content: Content, xobjects: &[(String, Ref)]) {
        let content_id = self.alloc.bump();
        let page_id = self.alloc.bump();
        self.pdf.stream(content_id, &content.finish());

        let geo = &self.template.page;
        {
            let mut page = self.pdf.page(page_id);
            page.media_box(Rect::new(0.0, 0.0, geo.width, geo.height))
                .parent(self.pages_id)
                .contents(content_id);
            let mut resources = page.resources();
            {
                let mut fonts = resources.fonts();
                fonts.pair(Name(FONT_REGULAR), self.font_regular);
                fonts.pair(Name(FONT_BOLD), self.font_bold);
            }
            if !xobjects.is_empty() {
                let mut dict = resources.x_objects();
                for (name, id) in xobjects {
                    dict.pair(Name(name.as_bytes()), *id);
                }
            }
        }
        self.page_ids.push(page_id);
    }

    fn footer(&self, content: &mut Content, page_no: usize, total: usize) {
        let geo = &self.template.page;
        let footer = &self.template.footer;
        let y = geo.margin;
        if !footer.left_text.is_empty() {
            self.text(
                content,
                FONT_REGULAR,
                footer.font_size,
                self.colors.muted,
                geo.margin,
                y,
                &footer.left_text,
            );
        }
        let label = footer.page_text(page_no, total);
        let x = geo.width - geo.margin - Self::text_width(footer.font_size, &label);
        self.text(
            content,
            FONT_REGULAR,
            footer.font_size,
            self.colors.muted,
            x,
            y,
            &label,
        );
    }

    /// Area for cover art: the upper part of the page inside the margins.
    fn cover_area(&self) -> Area {
        let geo = &self.template.page;
        let h = (geo.height - 2.0 * geo.margin) * 0.6;
        Area {
            x: geo.margin,
            y: geo.height - geo.margin - h,
            w: geo.width - 2.0 * geo.margin,
            h,
        }
    }

    fn cover_page(
        &mut self,
        cover: Option<&CoverImage>,
        title: &str,
        subtitle: &str,
        page_no: usize,
        total: usize,
    ) {
        let mut content = Content::new();
        let mut xobjects = Vec::new();
        let area = self.cover_area();
        match cover {
            Some(cover) => {
                let id = self.embed_cover(cover);
                let fitted = area.fit(cover.image.width as f32, cover.image.height as f32);
                Self::draw_xobject(&mut content, "Cover", fitted);
                xobjects.push(("Cover".to_string(), id));
            }
            None => Self::fill_rect(&mut content, self.colors.band, area),
        }

        let geo = &self.template.page;
        let size = self.template.title_font_size * 1.6;
        let title_y = area.y - size - 24.0;
        self.text(
            &mut content,
            FONT_BOLD,
            size,
            self.colors.primary,
            geo.margin,
            title_y,
            title,
        );
        if !subtitle.is_empty() {
            self.text(
                &mut content,
                FONT_REGULAR,
                self.template.subtitle_font_size * 1.2,
                self.colors.muted,
                geo.margin,
                title_y - self.template.subtitle_font_size * 1.2 - 10.0,
                subtitle,
            );
        }
        self.footer(&mut content, page_no, total);
        self.finish_page(content, &xobjects);
    }

    fn chart_page(
        &mut self,
        snapshot: &ChartSnapshot,
        vector: bool,
        jpeg_quality: f32,
        page_no: usize,
        total: usize,
    ) -> bool {
        let t = self.template;
        let geo = &t.page;
        let mut content = Content::new();
        let mut xobjects = Vec::new();

        let title_y = geo.height - geo.margin - t.title_font_size;
        self.text(
            &mut content,
            FONT_BOLD,
            t.title_font_size,
            self.colors.text,
            geo.margin,
            title_y,
            &snapshot.name,
        );
        if let Some(sub) = snapshot.subtitle() {
            self.text(
                &mut content,
                FONT_REGULAR,
                t.subtitle_font_size,
                self.colors.muted,
                geo.margin,
                title_y - t.subtitle_font_size - 6.0,
                &sub,
            );
        }
        let rule_y = geo.height - geo.margin - geo.header_height;
        let [r, g, b] = self.colors.primary;
        content.save_state();
        content.set_stroke_rgb(r, g, b);
        content.set_line_width(0.75);
        content.move_to(geo.margin, rule_y);
        content.line_to(geo.width - geo.margin, rule_y);
        content.stroke();
        content.restore_state();

        let inset = t.image_inset.max(0.0);
        let area = Area {
            x: geo.margin + inset,
            y: geo.margin + geo.footer_height + inset,
            w: geo.width - 2.0 * (geo.margin + inset),
            h: geo.height
                - 2.0 * geo.margin
                - geo.header_height
                - geo.footer_height
                - 2.0 * inset,
        };

        let mut drew_vector = false;
        if vector {
            if let Some(svg) = snapshot.svg.as_deref() {
                if let Some(id) = self.embed_svg(&snapshot.chart_id, svg) {
                    let natural_w = snapshot.bounds.width as f32 * t.px_to_pt;
                    let natural_h = snapshot.bounds.height as f32 * t.px_to_pt;
                    Self::draw_xobject(&mut content, "Chart", area.fit(natural_w, natural_h));
                    xobjects.push(("Chart".to_string(), id));
                    drew_vector = true;
                }
            }
        }
        if !drew_vector {
            let primary = if snapshot.primary.format == ImageFormat::Jpeg {
                Some(snapshot.primary.clone())
            } else {
                Some(compress(&snapshot.primary, jpeg_quality))
                    .filter(|img| img.format == ImageFormat::Jpeg)
            };
            match primary {
                Some(img) => {
                    let id = self.embed_jpeg(&img);
                    let natural_w = img.width as f32 * t.px_to_pt;
                    let natural_h = img.height as f32 * t.px_to_pt;
                    Self::draw_xobject(&mut content, "Chart", area.fit(natural_w, natural_h));
                    xobjects.push(("Chart".to_string(), id));
                }
                None => {
                    tracing::warn!(chart = %snapshot.chart_id, "chart image not embeddable");
                    Self::fill_rect(&mut content, self.colors.band, area);
                    self.text(
                        &mut content,
                        FONT_REGULAR,
                        t.subtitle_font_size,
                        self.colors.muted,
                        area.x + 12.0,
                        area.y + area.h / 2.0,
                        "Chart image unavailable",
                    );
                }
            }
        }

        self.footer(&mut content, page_no, total);
        self.finish_page(content, &xobjects);
        drew_vector
    }

    fn finish(mut self, title: &str, created: DateTime<Utc>) -> Vec<u8> {
        let count = self.page_ids.len() as i32;
        self.pdf
            .pages(self.pages_id)
            .kids(self.page_ids.iter().copied())
            .count(count);

        let info_id = self.alloc.bump();
        let date = Date::new(created.year().clamp(0, 9999) as u16)
            .month(created.month() as u8)
            .day(created.day() as u8)
            .hour(created.hour() as u8)
            .minute(created.minute() as u8)
            .second(created.second() as u8);
        self.pdf
            .document_info(info_id)
            .title(TextStr(title))
            .producer(TextStr("chartbook"))
            .creation_date(date);
        self.pdf.finish()
    }
}

/// Writes `snapshots` as one paginated PDF following [`plan_pages`].
pub fn assemble_pdf(
    snapshots: &[ChartSnapshot],
    assets: &ExportAssets,
    options: &AssemblyOptions,
) -> Result<AssembledDocument, AssemblyError> {
    if snapshots.is_empty() {
        return Err(AssemblyError::NoPages);
    }
    let template = &assets.template;
    let geo = &template.page;
    let content_h = geo.height - 2.0 * geo.margin - geo.header_height - geo.footer_height;
    let content_w = geo.width - 2.0 * geo.margin;
    if !(content_w > 0.0 && content_h > 0.0) {
        return Err(AssemblyError::Geometry {
            width: geo.width,
            height: geo.height,
        });
    }

    let plan = plan_pages(snapshots, &assets.covers);
    let total = plan.total();
    let mut builder = PdfBuilder::new(template, options.vector_pages);
    let mut vector_pages = 0usize;
    let mut chart_ids = Vec::with_capacity(snapshots.len());

    for (i, page) in plan.pages.iter().enumerate() {
        let page_no = i + 1;
        match page {
            PlannedPage::DocumentCover { image } => {
                let cover = image.as_deref().and_then(|p| assets.image(p));
                let subtitle = format!(
                    "{} charts · {}",
                    snapshots.len(),
                    options.created.format("%Y-%m-%d")
                );
                builder.cover_page(cover, &template.document_title, &subtitle, page_no, total);
            }
            PlannedPage::SectionCover { cover_key, image } => {
                let cover = image.as_deref().and_then(|p| assets.image(p));
                let title = assets.covers.title_for(cover_key);
                builder.cover_page(cover, title, "", page_no, total);
            }
            PlannedPage::Chart { snapshot, .. } => {
                let s = &snapshots[*snapshot];
                if builder.chart_page(s, options.vector_pages, options.jpeg_quality, page_no, total)
                {
                    vector_pages += 1;
                }
                chart_ids.push(s.chart_id.clone());
            }
        }
    }

    let bytes = builder.finish(&template.document_title, options.created);
    tracing::info!(
        pages = total,
        charts = chart_ids.len(),
        vector_pages,
        bytes = bytes.len(),
        "document assembled"
    );
    Ok(AssembledDocument {
        bytes,
        page_count: total,
        chart_ids,
        vector_pages,
    })
}
