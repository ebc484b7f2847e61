//! Bidirectional tag-id ↔ tag-name tables, one per IFD namespace.
//!
//! The JPEG read path namespaces unified EXIF keys as `"IFD:TagName"` (bare
//! for the 0th IFD); the write path reverses that convention through these
//! tables. A key whose name has no table entry cannot be re-encoded and is
//! skipped — the caller counts and logs such keys.
//!
//! Names follow the EXIF 2.32 spelling used by the decoder, so keys read from
//! a file round-trip through the same table.

/// IFD namespace within an EXIF block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IfdNamespace {
    /// 0th IFD (primary image / TIFF tags). Keys carry no prefix.
    Ifd0,
    /// Exif sub-IFD. Keys carry the `Exif:` prefix.
    Exif,
    /// GPS sub-IFD. Keys carry the `GPS:` prefix.
    Gps,
    /// 1st IFD (thumbnail). Keys carry the `1st:` prefix.
    First,
}

impl IfdNamespace {
    /// Parse the namespace prefix of a unified EXIF key, returning the
    /// namespace and the bare tag name.
    pub fn split_key(key: &str) -> (Self, &str) {
        match key.split_once(':') {
            Some(("Exif", name)) => (Self::Exif, name),
            Some(("GPS", name)) => (Self::Gps, name),
            Some(("1st", name)) => (Self::First, name),
            _ => (Self::Ifd0, key),
        }
    }

    /// Key prefix for this namespace (empty for the 0th IFD).
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Ifd0 => "",
            Self::Exif => "Exif:",
            Self::Gps => "GPS:",
            Self::First => "1st:",
        }
    }

    fn table(&self) -> &'static [(u16, &'static str)] {
        match self {
            // Thumbnail IFD reuses the TIFF tag set
            Self::Ifd0 | Self::First => IFD0_TAGS,
            Self::Exif => EXIF_TAGS,
            Self::Gps => GPS_TAGS,
        }
    }
}

/// Numeric tag id for a name within a namespace.
pub fn tag_id(ns: IfdNamespace, name: &str) -> Option<u16> {
    ns.table().iter().find(|(_, n)| *n == name).map(|(id, _)| *id)
}

/// Canonical name for a tag id within a namespace.
pub fn tag_name(ns: IfdNamespace, id: u16) -> Option<&'static str> {
    ns.table().iter().find(|(i, _)| *i == id).map(|(_, n)| *n)
}

/// 0th/1st IFD (baseline TIFF) tags.
pub const IFD0_TAGS: &[(u16, &str)] = &[
    (0x0100, "ImageWidth"),
    (0x0101, "ImageLength"),
    (0x0102, "BitsPerSample"),
    (0x0103, "Compression"),
    (0x0106, "PhotometricInterpretation"),
    (0x010E, "ImageDescription"),
    (0x010F, "Make"),
    (0x0110, "Model"),
    (0x0112, "Orientation"),
    (0x0115, "SamplesPerPixel"),
    (0x011A, "XResolution"),
    (0x011B, "YResolution"),
    (0x011C, "PlanarConfiguration"),
    (0x0128, "ResolutionUnit"),
    (0x0131, "Software"),
    (0x0132, "DateTime"),
    (0x013B, "Artist"),
    (0x013E, "WhitePoint"),
    (0x013F, "PrimaryChromaticities"),
    (0x0211, "YCbCrCoefficients"),
    (0x0212, "YCbCrSubSampling"),
    (0x0213, "YCbCrPositioning"),
    (0x0214, "ReferenceBlackWhite"),
    (0x8298, "Copyright"),
];

/// Exif sub-IFD tags.
pub const EXIF_TAGS: &[(u16, &str)] = &[
    (0x829A, "ExposureTime"),
    (0x829D, "FNumber"),
    (0x8822, "ExposureProgram"),
    (0x8824, "SpectralSensitivity"),
    (0x8827, "PhotographicSensitivity"),
    (0x8830, "SensitivityType"),
    (0x9000, "ExifVersion"),
    (0x9003, "DateTimeOriginal"),
    (0x9004, "DateTimeDigitized"),
    (0x9101, "ComponentsConfiguration"),
    (0x9102, "CompressedBitsPerPixel"),
    (0x9201, "ShutterSpeedValue"),
    (0x9202, "ApertureValue"),
    (0x9203, "BrightnessValue"),
    (0x9204, "ExposureBiasValue"),
    (0x9205, "MaxApertureValue"),
    (0x9206, "SubjectDistance"),
    (0x9207, "MeteringMode"),
    (0x9208, "LightSource"),
    (0x9209, "Flash"),
    (0x920A, "FocalLength"),
    (0x9214, "SubjectArea"),
    (0x927C, "MakerNote"),
    (0x9286, "UserComment"),
    (0x9290, "SubSecTime"),
    (0x9291, "SubSecTimeOriginal"),
    (0x9292, "SubSecTimeDigitized"),
    (0xA000, "FlashpixVersion"),
    (0xA001, "ColorSpace"),
    (0xA002, "PixelXDimension"),
    (0xA003, "PixelYDimension"),
    (0xA004, "RelatedSoundFile"),
    (0xA20B, "FlashEnergy"),
    (0xA20E, "FocalPlaneXResolution"),
    (0xA20F, "FocalPlaneYResolution"),
    (0xA210, "FocalPlaneResolutionUnit"),
    (0xA214, "SubjectLocation"),
    (0xA215, "ExposureIndex"),
    (0xA217, "SensingMethod"),
    (0xA300, "FileSource"),
    (0xA301, "SceneType"),
    (0xA401, "CustomRendered"),
    (0xA402, "ExposureMode"),
    (0xA403, "WhiteBalance"),
    (0xA404, "DigitalZoomRatio"),
    (0xA405, "FocalLengthIn35mmFilm"),
    (0xA406, "SceneCaptureType"),
    (0xA407, "GainControl"),
    (0xA408, "Contrast"),
    (0xA409, "Saturation"),
    (0xA40A, "Sharpness"),
    (0xA40C, "SubjectDistanceRange"),
    (0xA420, "ImageUniqueID"),
    (0xA430, "CameraOwnerName"),
    (0xA431, "BodySerialNumber"),
    (0xA432, "LensSpecification"),
    (0xA433, "LensMake"),
    (0xA434, "LensModel"),
    (0xA435, "LensSerialNumber"),
];

/// GPS sub-IFD tags.
pub const GPS_TAGS: &[(u16, &str)] = &[
    (0x0000, "GPSVersionID"),
    (0x0001, "GPSLatitudeRef"),
    (0x0002, "GPSLatitude"),
    (0x0003, "GPSLongitudeRef"),
    (0x0004, "GPSLongitude"),
    (0x0005, "GPSAltitudeRef"),
    (0x0006, "GPSAltitude"),
    (0x0007, "GPSTimeStamp"),
    (0x0008, "GPSSatellites"),
    (0x0009, "GPSStatus"),
    (0x000A, "GPSMeasureMode"),
    (0x000B, "GPSDOP"),
    (0x000C, "GPSSpeedRef"),
    (0x000D, "GPSSpeed"),
    (0x000E, "GPSTrackRef"),
    (0x000F, "GPSTrack"),
    (0x0010, "GPSImgDirectionRef"),
    (0x0011, "GPSImgDirection"),
    (0x0012, "GPSMapDatum"),
    (0x0013, "GPSDestLatitudeRef"),
    (0x0014, "GPSDestLatitude"),
    (0x0015, "GPSDestLongitudeRef"),
    (0x0016, "GPSDestLongitude"),
    (0x001B, "GPSProcessingMethod"),
    (0x001D, "GPSDateStamp"),
    (0x001E, "GPSDifferential"),
    (0x001F, "GPSHPositioningError"),
];
