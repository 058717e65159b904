// Skeleton overlay for local preview and diagnostic frame dumps

use crate::models::pose::{LandmarkSet, SKELETON_GRAPH};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};

const MARKER_RADIUS: i32 = 5;
const MARKER_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BONE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Draw a marker at every landmark and a line for every edge.
///
/// Landmarks are scaled to pixels here; nothing is drawn for an empty set.
/// Edges referencing a missing landmark are skipped.
pub fn draw_pose_overlay(image: &mut RgbImage, landmarks: &LandmarkSet, edges: &[(usize, usize)]) {
    if landmarks.is_empty() {
        return;
    }

    let (width, height) = image.dimensions();

    for &(start, end) in edges {
        let (Some(a), Some(b)) = (landmarks.get(start), landmarks.get(end)) else {
            continue;
        };
        let (x1, y1) = a.to_pixel(width, height);
        let (x2, y2) = b.to_pixel(width, height);
        // Two parallel segments give a 2px bone
        draw_line_segment_mut(image, (x1, y1), (x2, y2), BONE_COLOR);
        draw_line_segment_mut(image, (x1 + 1.0, y1), (x2 + 1.0, y2), BONE_COLOR);
    }

    for landmark in landmarks.iter() {
        let (x, y) = landmark.to_pixel(width, height);
        draw_filled_circle_mut(image, (x as i32, y as i32), MARKER_RADIUS, MARKER_COLOR);
    }
}

/// Copy of `frame` with the body skeleton drawn on top
pub fn render_overlay(frame: &RgbImage, landmarks: &LandmarkSet) -> RgbImage {
    let mut annotated = frame.clone();
    draw_pose_overlay(&mut annotated, landmarks, &SKELETON_GRAPH);
    annotated
}
