use crate::classify::Status;
use crate::detector::Detection;
use opencv::{
    core::{self, Mat, Point, Rect, Scalar, Vector},
    imgcodecs, imgproc,
    prelude::*,
};
use thiserror::Error;

const JPEG_QUALITY: i32 = 85;
const COLOR_DEFECT: (f64, f64, f64) = (0.0, 0.0, 255.0);
const COLOR_OK: (f64, f64, f64) = (0.0, 255.0, 0.0);
const COLOR_WHITE: (f64, f64, f64) = (255.0, 255.0, 255.0);

#[derive(Error, Debug)]
pub enum CvUtilsError {
    #[error("Failed to encode frame: {0}")]
    EncodeFrameFailed(opencv::Error),
    #[error("OpenCV error: {0}")]
    OpenCvError(opencv::Error),
}

impl From<opencv::Error> for CvUtilsError {
    fn from(err: opencv::Error) -> Self {
        CvUtilsError::OpenCvError(err)
    }
}

fn bgr(color: (f64, f64, f64)) -> Scalar {
    Scalar::new(color.0, color.1, color.2, 0.0)
}

pub struct ImageConverter;

impl ImageConverter {
    pub fn encode_mat_to_jpg(mat: &Mat) -> Result<Vec<u8>, CvUtilsError> {
        let mut buf = Vector::<u8>::new();
        let params = Vector::from_slice(&[imgcodecs::IMWRITE_JPEG_QUALITY, JPEG_QUALITY]);
        imgcodecs::imencode(".jpg", mat, &mut buf, &params)
            .map_err(CvUtilsError::EncodeFrameFailed)?;
        Ok(buf.into())
    }

    /// Draws one box per detection, red for defects and green otherwise,
    /// with a filled label tag above each box.
    pub fn annotate_detections(
        frame: &mut Mat,
        detections: &[Detection],
        defect_flags: &[bool],
    ) -> Result<(), CvUtilsError> {
        for (detection, &is_defect) in detections.iter().zip(defect_flags) {
            let x1 = detection.x1 as i32;
            let y1 = detection.y1 as i32;
            let x2 = detection.x2 as i32;
            let y2 = detection.y2 as i32;

            let color = if is_defect {
                bgr(COLOR_DEFECT)
            } else {
                bgr(COLOR_OK)
            };
            let tag = format!(
                "{} {:.2}",
                detection.label.to_uppercase(),
                detection.confidence
            );

            imgproc::rectangle(
                frame,
                Rect::new(x1, y1, x2 - x1, y2 - y1),
                color,
                2,
                imgproc::LINE_8,
                0,
            )
            .map_err(CvUtilsError::from)?;

            let mut baseline = 0;
            let tag_size = imgproc::get_text_size(
                &tag,
                imgproc::FONT_HERSHEY_SIMPLEX,
                0.6,
                2,
                &mut baseline,
            )
            .map_err(CvUtilsError::from)?;

            imgproc::rectangle(
                frame,
                Rect::new(x1, y1 - tag_size.height - 10, tag_size.width, tag_size.height + 10),
                color,
                imgproc::FILLED,
                imgproc::LINE_8,
                0,
            )
            .map_err(CvUtilsError::from)?;

            imgproc::put_text(
                frame,
                &tag,
                Point::new(x1, y1 - 5),
                imgproc::FONT_HERSHEY_SIMPLEX,
                0.6,
                bgr(COLOR_WHITE),
                2,
                imgproc::LINE_AA,
                false,
            )
            .map_err(CvUtilsError::from)?;
        }
        Ok(())
    }

    /// Semi-transparent banner in the top-left corner carrying FPS, the
    /// frame verdict, and a one-line detail.
    pub fn draw_status_banner(
        frame: &mut Mat,
        status: Status,
        fps: u32,
    ) -> Result<(), CvUtilsError> {
        let mut overlay = frame.try_clone().map_err(CvUtilsError::from)?;
        imgproc::rectangle(
            &mut overlay,
            Rect::new(5, 5, 645, 75),
            Scalar::new(0.0, 0.0, 0.0, 0.0),
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )
        .map_err(CvUtilsError::from)?;

        let base = frame.try_clone().map_err(CvUtilsError::from)?;
        core::add_weighted(&overlay, 0.7, &base, 0.3, 0.0, frame, -1)
            .map_err(CvUtilsError::from)?;

        let (status_color, detail) = match status {
            Status::Pass => (bgr(COLOR_OK), "No defects detected"),
            Status::Ng => (bgr(COLOR_DEFECT), "Defect detected!"),
        };

        imgproc::put_text(
            frame,
            &format!("FPS: {}", fps),
            Point::new(10, 25),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.6,
            bgr(COLOR_WHITE),
            2,
            imgproc::LINE_AA,
            false,
        )
        .map_err(CvUtilsError::from)?;

        imgproc::put_text(
            frame,
            &format!("Status: {}", status.as_str()),
            Point::new(10, 50),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.7,
            status_color,
            2,
            imgproc::LINE_AA,
            false,
        )
        .map_err(CvUtilsError::from)?;

        imgproc::put_text(
            frame,
            detail,
            Point::new(10, 70),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.5,
            bgr(COLOR_WHITE),
            1,
            imgproc::LINE_AA,
            false,
        )
        .map_err(CvUtilsError::from)?;

        Ok(())
    }
}
