//! Parsing of scripted edit operations given on the command line.

use std::path::PathBuf;
use std::str::FromStr;

use maskforge_core::{Point, Tolerance};

/// One mask operation, replayed through an edit session.
#[derive(Debug, Clone, PartialEq)]
pub enum MaskOp {
    /// A freehand stroke through the listed points.
    Brush(Vec<Point>),
    /// A rectangle dragged between two corners.
    Rect(Point, Point),
    /// A magic-wand click, with an optional tolerance override.
    Wand(Point, Option<Tolerance>),
    /// Reset the mask.
    Clear,
}

impl FromStr for MaskOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "clear" {
            return Ok(Self::Clear);
        }
        let (kind, args) = s
            .split_once(':')
            .ok_or_else(|| format!("expected KIND:ARGS or `clear`, got {s:?}"))?;
        match kind {
            "brush" => {
                let points = args
                    .split(';')
                    .map(parse_point)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::Brush(points))
            }
            "rect" => {
                let [x0, y0, x1, y1] = parse_numbers::<4>(args)?;
                Ok(Self::Rect(Point::new(x0, y0), Point::new(x1, y1)))
            }
            "wand" => {
                let (point, tolerance) = match args.split_once('@') {
                    Some((point, tol)) => (point, Some(parse_tolerance(tol)?)),
                    None => (args, None),
                };
                Ok(Self::Wand(parse_point(point)?, tolerance))
            }
            other => Err(format!(
                "unknown operation {other:?} (expected brush, rect, wand, or clear)"
            )),
        }
    }
}

/// An overlay image and where to put it.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlaySpec {
    /// Image file.
    pub path: PathBuf,
    /// Explicit top-left corner; fitted and centered when absent.
    pub position: Option<Point>,
    /// Explicit scale.
    pub scale: Option<f64>,
    /// Rotation in degrees.
    pub rotation: Option<f64>,
}

impl FromStr for OverlaySpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Only treat the last `@` as a separator if what follows parses.
        if let Some((path, placement)) = s.rsplit_once('@')
            && let Ok(numbers) = parse_list(placement)
        {
            let (position, scale, rotation) = match numbers.as_slice() {
                [x, y] => (Point::new(*x, *y), None, None),
                [x, y, scale] => (Point::new(*x, *y), Some(*scale), None),
                [x, y, scale, rotation] => (Point::new(*x, *y), Some(*scale), Some(*rotation)),
                _ => {
                    return Err(format!(
                        "overlay placement must be X,Y[,SCALE[,ROT]], got {placement:?}"
                    ));
                }
            };
            return Ok(Self {
                path: PathBuf::from(path),
                position: Some(position),
                scale,
                rotation,
            });
        }
        Ok(Self {
            path: PathBuf::from(s),
            position: None,
            scale: None,
            rotation: None,
        })
    }
}

fn parse_list(s: &str) -> Result<Vec<f64>, String> {
    s.split(',')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .map_err(|e| format!("invalid number {part:?}: {e}"))
        })
        .collect()
}

fn parse_numbers<const N: usize>(s: &str) -> Result<[f64; N], String> {
    let values = parse_list(s)?;
    values
        .try_into()
        .map_err(|v: Vec<f64>| format!("expected {N} numbers, got {}", v.len()))
}

fn parse_point(s: &str) -> Result<Point, String> {
    let [x, y] = parse_numbers::<2>(s)?;
    Ok(Point::new(x, y))
}

fn parse_tolerance(s: &str) -> Result<Tolerance, String> {
    let value = s
        .trim()
        .parse::<u8>()
        .map_err(|e| format!("invalid tolerance {s:?}: {e}"))?;
    Tolerance::new(value).map_err(|e| e.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_brush_points() {
        let op: MaskOp = "brush:0,0; 50.5,50".parse().unwrap();
        assert_eq!(
            op,
            MaskOp::Brush(vec![Point::new(0.0, 0.0), Point::new(50.5, 50.0)])
        );
    }

    #[test]
    fn parses_rect_and_clear() {
        assert_eq!(
            "rect:80,80,10,10".parse::<MaskOp>().unwrap(),
            MaskOp::Rect(Point::new(80.0, 80.0), Point::new(10.0, 10.0))
        );
        assert_eq!("clear".parse::<MaskOp>().unwrap(), MaskOp::Clear);
    }

    #[test]
    fn parses_wand_with_and_without_tolerance() {
        assert_eq!(
            "wand:5,6".parse::<MaskOp>().unwrap(),
            MaskOp::Wand(Point::new(5.0, 6.0), None)
        );
        assert_eq!(
            "wand:5,6@45".parse::<MaskOp>().unwrap(),
            MaskOp::Wand(Point::new(5.0, 6.0), Some(Tolerance::new(45).unwrap()))
        );
        assert!("wand:5,6@101".parse::<MaskOp>().is_err());
    }

    #[test]
    fn rejects_malformed_ops() {
        assert!("brush".parse::<MaskOp>().is_err());
        assert!("rect:1,2,3".parse::<MaskOp>().is_err());
        assert!("lasso:1,2".parse::<MaskOp>().is_err());
        assert!("brush:1,x".parse::<MaskOp>().is_err());
    }

    #[test]
    fn overlay_spec_variants() {
        let bare: OverlaySpec = "logo.png".parse().unwrap();
        assert_eq!(bare.path, PathBuf::from("logo.png"));
        assert_eq!(bare.position, None);

        let full: OverlaySpec = "art/logo@2x.png@10,20,0.5,45".parse().unwrap();
        assert_eq!(full.path, PathBuf::from("art/logo@2x.png"));
        assert_eq!(full.position, Some(Point::new(10.0, 20.0)));
        assert_eq!(full.scale, Some(0.5));
        assert_eq!(full.rotation, Some(45.0));

        // A trailing `@` segment that is not a placement stays in the path.
        let odd: OverlaySpec = "icons/@home.png".parse().unwrap();
        assert_eq!(odd.path, PathBuf::from("icons/@home.png"));
        assert!("logo.png@1".parse::<OverlaySpec>().is_err());
    }
}
