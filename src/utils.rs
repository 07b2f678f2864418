use imageproc::point::Point;


/// Index of the largest score, the first one on ties.
/// Returns `None` for an empty slice.
pub fn argmax(input: &[f32]) -> Option<usize> {
    let mut iter = input.iter().enumerate();
    let (mut index, mut max) = iter.next()?;
    iter.for_each(|(i, v)| {
        if *v > *max {
            max = v;
            index = i;
        }
    });
    Some(index)
}

/// Whether the four points, taken in order, form a convex quadrilateral with non-zero area.
pub fn is_convex(quad: &[(f32, f32); 4]) -> bool {
    let mut sign = 0.0f32;
    for i in 0..4 {
        let (x0, y0) = quad[i];
        let (x1, y1) = quad[(i + 1) % 4];
        let (x2, y2) = quad[(i + 2) % 4];
        let cross = (x1 - x0) * (y2 - y1) - (y1 - y0) * (x2 - x1);
        if cross.abs() <= f32::EPSILON {
            return false;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    true
}

/// Axis aligned bounding rect of some pixel positions, as `[x, y, width, height]`.
/// Width and height count pixels, so a single point is 1x1.
pub fn bounding_rect(points: &[Point<i32>]) -> Option<[u32; 4]> {
    let first = points.first()?;
    let (mut xmin, mut ymin, mut xmax, mut ymax) = (first.x, first.y, first.x, first.y);
    for p in points {
        xmin = xmin.min(p.x);
        ymin = ymin.min(p.y);
        xmax = xmax.max(p.x);
        ymax = ymax.max(p.y);
    }
    Some([xmin as u32, ymin as u32, (xmax - xmin + 1) as u32, (ymax - ymin + 1) as u32])
}
