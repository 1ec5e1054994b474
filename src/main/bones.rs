use glam::Mat4;

/// Row-major 3x4 affine bone matrix, the layout a GPU skinning shader reads
/// from a storage buffer. The translation lives in the last column.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BoneMat34 {
    pub mat: [[f32; 4]; 3],
}

impl Default for BoneMat34 {
    fn default() -> Self {
        Self {
            mat: [
                [1f32, 0f32, 0f32, 0f32],
                [0f32, 1f32, 0f32, 0f32],
                [0f32, 0f32, 1f32, 0f32],
            ],
        }
    }
}

impl From<&Mat4> for BoneMat34 {
    fn from(m: &Mat4) -> Self {
        // glam is column-major, the bottom row of an affine matrix is dropped
        let rows = m.transpose();
        Self {
            mat: [rows.x_axis.to_array(), rows.y_axis.to_array(), rows.z_axis.to_array()],
        }
    }
}

impl BoneMat34 {
    pub fn to_mat4(&self) -> Mat4 {
        let [x, y, z] = self.mat;
        Mat4::from_cols_array_2d(&[x, y, z, [0.0, 0.0, 0.0, 1.0]]).transpose()
    }
}

pub fn export_bones(ref_to_current: &[Mat4]) -> Vec<BoneMat34> {
    let mut out = Vec::with_capacity(ref_to_current.len());
    export_into(ref_to_current, &mut out);
    out
}

pub fn export_into(ref_to_current: &[Mat4], out: &mut Vec<BoneMat34>) {
    out.clear();
    out.extend(ref_to_current.iter().map(BoneMat34::from));
}
