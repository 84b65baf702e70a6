use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::warn;

/// Utility: detect whether the file uses comma or tab as delimiter.
fn detect_delimiter<P: AsRef<Path>>(path: P) -> Result<u8> {
    let file = File::open(&path).with_context(|| {
        format!(
            "failed to open file for delimiter sniffing: {:?}",
            path.as_ref()
        )
    })?;
    let mut reader = BufReader::new(file);
    let mut first_line = String::new();
    reader
        .read_line(&mut first_line)
        .with_context(|| "failed to read first line for delimiter detection")?;

    let tabs = first_line.matches('\t').count();
    let commas = first_line.matches(',').count();

    if tabs > commas {
        Ok(b'\t')
    } else {
        Ok(b',')
    }
}

/// A single 2D nodule candidate found by the segmenter on one slice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection2D {
    pub slice: usize,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Radius in pixels.
    pub radius: f32,
}

impl Detection2D {
    pub fn new(slice: usize, x: f32, y: f32, radius: f32) -> Self {
        Detection2D {
            slice,
            x,
            y,
            z: slice as f32,
            radius,
        }
    }
}

/// A chain of 2D detections on consecutive slices.
///
/// `region` summarizes the chain (mean centroid, largest radius). Objects read
/// as already-built 3D regions carry no members and only the summary.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate3D {
    pub region: Detection2D,
    pub members: Vec<Detection2D>,
}

impl Candidate3D {
    /// Builds a candidate from members ordered by increasing slice.
    pub fn from_members(members: Vec<Detection2D>) -> Result<Self> {
        let first = members
            .first()
            .ok_or_else(|| anyhow!("a 3D candidate needs at least one member"))?;
        let n = members.len() as f32;
        let (sx, sy, sz) = members
            .iter()
            .fold((0.0, 0.0, 0.0), |(sx, sy, sz), m| (sx + m.x, sy + m.y, sz + m.z));
        let radius = members.iter().map(|m| m.radius).fold(0.0f32, f32::max);

        let region = Detection2D {
            slice: first.slice,
            x: sx / n,
            y: sy / n,
            z: sz / n,
            radius,
        };
        Ok(Candidate3D { region, members })
    }

    /// Starts a chain from its first detection.
    pub fn single(det: Detection2D) -> Self {
        Candidate3D {
            region: det,
            members: vec![det],
        }
    }

    /// Wraps an already-built region that has no 2D members.
    pub fn from_region(region: Detection2D) -> Self {
        Candidate3D {
            region,
            members: Vec::new(),
        }
    }

    pub fn length(&self) -> usize {
        self.members.len()
    }

    /// Appends `det` at the tail and refreshes the summary region.
    pub(crate) fn push_member(&mut self, det: Detection2D) {
        let n = self.members.len() as f32;
        self.region.x = (self.region.x * n + det.x) / (n + 1.0);
        self.region.y = (self.region.y * n + det.y) / (n + 1.0);
        self.region.z = (self.region.z * n + det.z) / (n + 1.0);
        self.region.radius = self.region.radius.max(det.radius);
        self.members.push(det);
    }
}

/// Raw CT slices stored contiguously, one `width * height` plane per slice.
#[derive(Debug, Clone)]
pub struct SliceStack {
    width: usize,
    height: usize,
    depth: usize,
    /// In-plane pixel spacing in mm.
    pixel_spacing: f32,
    data: Vec<u16>,
}

impl SliceStack {
    pub fn new(
        width: usize,
        height: usize,
        depth: usize,
        pixel_spacing: f32,
        data: Vec<u16>,
    ) -> Result<Self> {
        if data.len() != width * height * depth {
            return Err(anyhow!(
                "slice stack expects {}x{}x{} = {} pixels, got {}",
                width,
                height,
                depth,
                width * height * depth,
                data.len()
            ));
        }
        if !(pixel_spacing > 0.0) {
            return Err(anyhow!("pixel spacing must be positive, got {}", pixel_spacing));
        }
        Ok(SliceStack {
            width,
            height,
            depth,
            pixel_spacing,
            data,
        })
    }

    pub fn zeros(width: usize, height: usize, depth: usize, pixel_spacing: f32) -> Self {
        SliceStack {
            width,
            height,
            depth,
            pixel_spacing: pixel_spacing.max(f32::EPSILON),
            data: vec![0; width * height * depth],
        }
    }

    /// Stacks 16-bit grayscale slice images, one file per slice in order.
    /// Images of other depths are converted to 16 bits.
    pub fn from_slice_images<P: AsRef<Path>>(paths: &[P], pixel_spacing: f32) -> Result<Self> {
        let mut dims: Option<(u32, u32)> = None;
        let mut data = Vec::new();
        for path in paths {
            let img = image::open(path)
                .with_context(|| format!("failed to read slice image {:?}", path.as_ref()))?
                .into_luma16();
            let (w, h) = img.dimensions();
            match dims {
                None => dims = Some((w, h)),
                Some(expected) if expected != (w, h) => {
                    return Err(anyhow!(
                        "slice image {:?} is {}x{}, expected {}x{}",
                        path.as_ref(),
                        w,
                        h,
                        expected.0,
                        expected.1
                    ))
                }
                Some(_) => {}
            }
            data.extend_from_slice(img.as_raw());
        }
        let (w, h) = dims.ok_or_else(|| anyhow!("no slice images given"))?;
        Self::new(w as usize, h as usize, paths.len(), pixel_spacing, data)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixel_spacing(&self) -> f32 {
        self.pixel_spacing
    }

    pub fn slice(&self, z: usize) -> Option<&[u16]> {
        if z >= self.depth {
            return None;
        }
        let plane = self.width * self.height;
        Some(&self.data[z * plane..(z + 1) * plane])
    }

    pub fn slice_mut(&mut self, z: usize) -> Option<&mut [u16]> {
        if z >= self.depth {
            return None;
        }
        let plane = self.width * self.height;
        Some(&mut self.data[z * plane..(z + 1) * plane])
    }
}

/// Reads upstream 2D detections (`slice,x,y,z,radius`) from a CSV or TSV file.
pub fn read_detections<P: AsRef<Path>>(path: P) -> Result<Vec<Detection2D>> {
    let delim = detect_delimiter(&path)?;
    let file = File::open(&path)
        .with_context(|| format!("failed to open detection file {:?}", path.as_ref()))?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delim)
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut detections = Vec::new();
    for result in rdr.records() {
        match result {
            Ok(record) => match record.deserialize::<Detection2D>(None) {
                Ok(det) => detections.push(det),
                Err(e) => warn!("Skipping invalid detection record: {:?}", e),
            },
            Err(e) => warn!("Skipping invalid detection row: {:?}", e),
        }
    }

    Ok(detections)
}
