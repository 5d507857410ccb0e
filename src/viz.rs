//! Animated drawing of per-epoch predictions.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::Result;
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, Rgba, RgbaImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_circle_mut, draw_line_segment_mut,
};
use imageproc::rect::Rect;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::info;

use crate::train::TrainReport;

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const EDGE: Rgba<u8> = Rgba([190, 190, 190, 255]);
const OUTLINE: Rgba<u8> = Rgba([0, 0, 0, 255]);
const CLASS_COLORS: [Rgba<u8>; 2] = [Rgba([0, 255, 255, 255]), Rgba([255, 0, 255, 255])];

// 3x5 bitmaps, one row per byte, most significant of the low three bits on the left.
const GLYPHS: [(char, [u8; 5]); 16] = [
    ('0', [0b111, 0b101, 0b101, 0b101, 0b111]),
    ('1', [0b010, 0b110, 0b010, 0b010, 0b111]),
    ('2', [0b111, 0b001, 0b111, 0b100, 0b111]),
    ('3', [0b111, 0b001, 0b111, 0b001, 0b111]),
    ('4', [0b101, 0b101, 0b111, 0b001, 0b001]),
    ('5', [0b111, 0b100, 0b111, 0b001, 0b111]),
    ('6', [0b111, 0b100, 0b111, 0b101, 0b111]),
    ('7', [0b111, 0b001, 0b010, 0b010, 0b010]),
    ('8', [0b111, 0b101, 0b111, 0b101, 0b111]),
    ('9', [0b111, 0b101, 0b111, 0b001, 0b111]),
    ('E', [0b111, 0b100, 0b111, 0b100, 0b111]),
    ('P', [0b111, 0b101, 0b111, 0b100, 0b100]),
    ('O', [0b111, 0b101, 0b101, 0b101, 0b111]),
    ('C', [0b111, 0b100, 0b100, 0b100, 0b111]),
    ('H', [0b101, 0b101, 0b111, 0b101, 0b101]),
    (':', [0b000, 0b010, 0b000, 0b010, 0b000]),
];

/// Pixel width of `text` drawn at `scale`, one blank column between glyphs.
pub fn text_width(text: &str, scale: u32) -> u32 {
    let n = text.chars().count() as u32;
    (n * 4).saturating_sub(1) * scale
}

/// Draws `text` with its top-left corner at `origin`. Characters without a
/// glyph advance like a space.
pub fn draw_text_mut(
    img: &mut RgbaImage,
    text: &str,
    origin: (i32, i32),
    scale: u32,
    color: Rgba<u8>,
) {
    let step = scale as i32;
    for (i, c) in text.chars().enumerate() {
        let Some((_, rows)) = GLYPHS.iter().find(|(g, _)| *g == c) else {
            continue;
        };
        let left = origin.0 + i as i32 * 4 * step;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..3 {
                if bits & (0b100 >> col) != 0 {
                    let at = (left + col * step, origin.1 + row as i32 * step);
                    draw_filled_rect_mut(img, Rect::at(at.0, at.1).of_size(scale, scale), color);
                }
            }
        }
    }
}

/// Fruchterman-Reingold layout in the unit square.
pub fn spring_layout(
    num_nodes: usize,
    edges: &[(u32, u32)],
    seed: u64,
    iterations: usize,
) -> Vec<(f32, f32)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut pos: Vec<(f32, f32)> = (0..num_nodes).map(|_| (rng.gen(), rng.gen())).collect();
    if num_nodes < 2 {
        return pos;
    }
    let k = (1.0 / num_nodes as f32).sqrt();
    let mut temperature = 0.1;
    let cooling = temperature / (iterations as f32 + 1.0);

    for _ in 0..iterations {
        let mut disp = vec![(0f32, 0f32); num_nodes];
        for i in 0..num_nodes {
            for j in 0..num_nodes {
                if i == j {
                    continue;
                }
                let (dx, dy) = (pos[i].0 - pos[j].0, pos[i].1 - pos[j].1);
                let dist = (dx * dx + dy * dy).sqrt().max(0.01);
                let force = k * k / dist;
                disp[i].0 += dx / dist * force;
                disp[i].1 += dy / dist * force;
            }
        }
        for &(u, v) in edges {
            let (u, v) = (u as usize, v as usize);
            if u == v {
                continue;
            }
            let (dx, dy) = (pos[u].0 - pos[v].0, pos[u].1 - pos[v].1);
            let dist = (dx * dx + dy * dy).sqrt().max(0.01);
            let force = dist * dist / k;
            disp[u].0 -= dx / dist * force;
            disp[u].1 -= dy / dist * force;
            disp[v].0 += dx / dist * force;
            disp[v].1 += dy / dist * force;
        }
        for (p, d) in pos.iter_mut().zip(&disp) {
            let len = (d.0 * d.0 + d.1 * d.1).sqrt().max(1e-9);
            let step = len.min(temperature);
            p.0 += d.0 / len * step;
            p.1 += d.1 / len * step;
        }
        temperature -= cooling;
    }
    normalize(&mut pos);
    pos
}

fn normalize(pos: &mut [(f32, f32)]) {
    let (mut lo_x, mut hi_x, mut lo_y, mut hi_y) = (f32::MAX, f32::MIN, f32::MAX, f32::MIN);
    for &(x, y) in pos.iter() {
        lo_x = lo_x.min(x);
        hi_x = hi_x.max(x);
        lo_y = lo_y.min(y);
        hi_y = hi_y.max(y);
    }
    let scale = (hi_x - lo_x).max(hi_y - lo_y).max(1e-9);
    for p in pos.iter_mut() {
        p.0 = (p.0 - lo_x) / scale;
        p.1 = (p.1 - lo_y) / scale;
    }
}

pub struct Animation {
    layout: Vec<(f32, f32)>,
    edges: Vec<(u32, u32)>,
    highlighted: Vec<u32>,
    size: u32,
    margin: u32,
    radius: i32,
    pub delay_ms: u32,
}
impl Animation {
    pub fn new(num_nodes: usize, edges: &[(u32, u32)], highlighted: &[u32], seed: u64) -> Self {
        Self {
            layout: spring_layout(num_nodes, edges, seed, 200),
            edges: edges.to_vec(),
            highlighted: highlighted.to_vec(),
            size: 480,
            margin: 36,
            radius: 11,
            delay_ms: 200,
        }
    }

    /// Pixel centre of node `v`.
    pub fn center(&self, v: usize) -> (f32, f32) {
        let span = (self.size - 2 * self.margin) as f32;
        let (x, y) = self.layout[v];
        (
            self.margin as f32 + x * span,
            self.margin as f32 + y * span,
        )
    }

    /// Draws the frame of `epoch` out of `num_epochs`: nodes coloured by
    /// class and labelled with their id, the epoch as a title and a progress
    /// bar along the bottom.
    pub fn render(&self, predictions: &[u32], epoch: usize, num_epochs: usize) -> RgbaImage {
        let mut img = RgbaImage::from_pixel(self.size, self.size, BACKGROUND);
        for &(u, v) in &self.edges {
            draw_line_segment_mut(&mut img, self.center(u as usize), self.center(v as usize), EDGE);
        }
        for (v, &class) in predictions.iter().enumerate().take(self.layout.len()) {
            let (x, y) = self.center(v);
            let center = (x.round() as i32, y.round() as i32);
            let color = CLASS_COLORS[class as usize % CLASS_COLORS.len()];
            draw_filled_circle_mut(&mut img, center, self.radius, color);
            if self.highlighted.contains(&(v as u32)) {
                draw_hollow_circle_mut(&mut img, center, self.radius + 1, OUTLINE);
                draw_hollow_circle_mut(&mut img, center, self.radius + 2, OUTLINE);
            }
            let label = v.to_string();
            let origin = (
                center.0 - (text_width(&label, 2) / 2) as i32,
                center.1 - 5,
            );
            draw_text_mut(&mut img, &label, origin, 2, OUTLINE);
        }
        draw_text_mut(&mut img, &format!("EPOCH: {epoch}"), (6, 6), 3, OUTLINE);

        let progress = (epoch + 1) as f32 / num_epochs.max(1) as f32;
        let width = ((self.size as f32) * progress.clamp(0.0, 1.0)).round() as u32;
        if width > 0 {
            draw_filled_rect_mut(
                &mut img,
                Rect::at(0, (self.size - 6) as i32).of_size(width, 6),
                OUTLINE,
            );
        }
        img
    }

    /// Writes one frame per epoch of `report` as a looping GIF.
    pub fn save_gif<P: AsRef<Path>>(&self, report: &TrainReport, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut encoder = GifEncoder::new(BufWriter::new(File::create(path)?));
        encoder.set_repeat(Repeat::Infinite)?;
        let total = report.history.len();
        for record in &report.history {
            let img = self.render(&record.predictions, record.epoch, total);
            let delay = Delay::from_numer_denom_ms(self.delay_ms, 1);
            encoder.encode_frame(Frame::from_parts(img, 0, 0, delay))?;
        }
        info!(path = %path.display(), frames = report.history.len(), "wrote animation");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::KarateClub;
    use crate::train::EpochRecord;

    #[test]
    fn layout_is_seeded_and_normalized() {
        let karate = KarateClub::builtin();
        let a = spring_layout(34, &karate.edges, 1, 50);
        let b = spring_layout(34, &karate.edges, 1, 50);
        assert_eq!(a, b);
        assert!(a
            .iter()
            .all(|&(x, y)| (0.0..=1.0).contains(&x) && (0.0..=1.0).contains(&y)));
    }

    #[test]
    fn nodes_are_painted_with_their_class() {
        let animation = Animation::new(2, &[(0, 1)], &[], 0);
        let img = animation.render(&[0, 1], 0, 1);
        for (v, color) in CLASS_COLORS.iter().enumerate() {
            let (x, y) = animation.center(v);
            // above the id label, inside the disc
            assert_eq!(img.get_pixel(x.round() as u32, y.round() as u32 - 8), color);
        }
    }

    #[test]
    fn node_ids_are_written_on_their_disc() {
        let animation = Animation::new(2, &[(0, 1)], &[], 0);
        let img = animation.render(&[0, 0], 0, 1);
        // the stem of "1" runs through the centre, "0" is hollow there
        let (x, y) = animation.center(1);
        assert_eq!(img.get_pixel(x.round() as u32, y.round() as u32), &OUTLINE);
        let (x, y) = animation.center(0);
        assert_eq!(img.get_pixel(x.round() as u32, y.round() as u32), &CLASS_COLORS[0]);
    }

    #[test]
    fn title_shows_the_epoch() {
        assert_eq!(text_width("EPOCH: 12", 3), 105);
        assert_eq!(text_width("", 3), 0);

        let animation = Animation::new(2, &[(0, 1)], &[], 0);
        let title = |img: &RgbaImage| -> Vec<Rgba<u8>> {
            (6..21)
                .flat_map(|y| (6..6 + 105).map(move |x| (x, y)))
                .map(|(x, y)| *img.get_pixel(x, y))
                .collect()
        };
        let third = title(&animation.render(&[0, 1], 3, 30));
        let twelfth = title(&animation.render(&[0, 1], 12, 30));
        assert!(third.contains(&OUTLINE));
        assert_ne!(third, twelfth);
    }

    #[test]
    fn writes_a_gif() -> Result<()> {
        let animation = Animation::new(3, &[(0, 1), (1, 2)], &[0, 2], 0);
        let report = TrainReport {
            history: (0..2)
                .map(|epoch| EpochRecord {
                    epoch,
                    loss: 1.0,
                    predictions: vec![0, epoch as u32, 1],
                })
                .collect(),
            accuracy: None,
        };
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.gif");
        animation.save_gif(&report, &path)?;
        let bytes = std::fs::read(&path)?;
        assert_eq!(&bytes[..6], b"GIF89a");
        Ok(())
    }
}
