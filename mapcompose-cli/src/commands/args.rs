//! Parsers for tile arguments.
//!
//! Tiles are written `source/z/x/y`; placed tiles add `@left,top,size`:
//!
//! ```text
//! osm/14/8529/5974@0,0,256
//! ```

use mapcompose::request::TileId;
use mapcompose::TileSpecEntry;

/// Parse `source/z/x/y`.
pub fn parse_tile_id(s: &str) -> Result<TileId, String> {
    let parts: Vec<&str> = s.split('/').collect();
    let [source, z, x, y] = parts.as_slice() else {
        return Err(format!("expected source/z/x/y, got '{}'", s));
    };
    if source.is_empty() {
        return Err(format!("missing source in '{}'", s));
    }
    let zoom = z
        .parse::<u8>()
        .map_err(|_| format!("invalid zoom '{}' in '{}'", z, s))?;
    let x = x
        .parse::<u32>()
        .map_err(|_| format!("invalid x '{}' in '{}'", x, s))?;
    let y = y
        .parse::<u32>()
        .map_err(|_| format!("invalid y '{}' in '{}'", y, s))?;
    Ok(TileId::new(*source, zoom, x, y))
}

/// Parse `source/z/x/y@left,top,size`.
pub fn parse_tile_entry(s: &str) -> Result<TileSpecEntry, String> {
    let (tile, placement) = s
        .split_once('@')
        .ok_or_else(|| format!("expected source/z/x/y@left,top,size, got '{}'", s))?;
    let tile = parse_tile_id(tile)?;

    let numbers = placement
        .split(',')
        .map(|n| n.trim().parse::<f64>())
        .collect::<Result<Vec<f64>, _>>()
        .map_err(|_| format!("invalid placement '{}' in '{}'", placement, s))?;
    let [left, top, size] = numbers.as_slice() else {
        return Err(format!("placement needs left,top,size in '{}'", s));
    };
    if !(size.is_finite() && *size > 0.0) {
        return Err(format!("tile size must be positive in '{}'", s));
    }

    Ok(TileSpecEntry::new(
        tile.source,
        tile.zoom,
        tile.x,
        tile.y,
        *left,
        *top,
        *size,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_tile_id() {
        assert_eq!(
            parse_tile_id("osm/14/8529/5974").unwrap(),
            TileId::new("osm", 14, 8529, 5974)
        );
        assert!(parse_tile_id("osm/14/8529").is_err());
        assert!(parse_tile_id("/1/2/3").is_err());
        assert!(parse_tile_id("osm/300/1/1").is_err());
    }

    #[test]
    fn test_parse_tile_entry() {
        let entry = parse_tile_entry("osm/3/4/2@512,-256.5,256").unwrap();
        assert_eq!(entry.tile_id(), TileId::new("osm", 3, 4, 2));
        assert_eq!(entry.left, 512.0);
        assert_eq!(entry.top, -256.5);
        assert_eq!(entry.size, 256.0);
    }

    #[test]
    fn test_parse_tile_entry_rejects_bad_placement() {
        assert!(parse_tile_entry("osm/3/4/2").is_err());
        assert!(parse_tile_entry("osm/3/4/2@1,2").is_err());
        assert!(parse_tile_entry("osm/3/4/2@1,2,x").is_err());
        assert!(parse_tile_entry("osm/3/4/2@1,2,0").is_err());
    }

    proptest! {
        #[test]
        fn test_any_valid_entry_parses(
            zoom in 0u8..=24,
            x in 0u32..1_000_000,
            y in 0u32..1_000_000,
            left in -10_000i32..10_000,
            top in -10_000i32..10_000,
            size in 1u32..4096,
        ) {
            let text = format!("src/{}/{}/{}@{},{},{}", zoom, x, y, left, top, size);
            let entry = parse_tile_entry(&text).unwrap();
            prop_assert_eq!(entry.tile_id(), TileId::new("src", zoom, x, y));
            prop_assert_eq!(entry.left, left as f64);
            prop_assert_eq!(entry.size, size as f64);
        }
    }
}
