// This file is part of rustmtcnn, a port of the face detection cascade described in the following paper:
//
//      Joint Face Detection and Alignment using Multi-task Cascaded Convolutional Networks,
//      Kaipeng Zhang, Zhanpeng Zhang, Zhifeng Li, Yu Qiao.
//      In IEEE Signal Processing Letters, 2016
//
// You can redistribute rustmtcnn source codes and/or modify it under the terms of the BSD 2-Clause License.
//
// You should have received a copy of the BSD 2-Clause License along with the software.
// If not, see < https://opensource.org/licenses/BSD-2-Clause>.

use tracing::info;

use crate::common::Stage;
use crate::error::CascadeError;
use crate::network::{BoxError, Network, Networks};

/// Resolves a cascade stage to a ready-to-use network.
///
/// Where the weights come from (files, embedded bytes, a runtime session) is
/// up to the implementation.
pub trait ModelProvider {
    fn load(&self, stage: Stage) -> Result<Box<dyn Network>, BoxError>;
}

/// Load all three networks. Fails on the first stage that can't be loaded
/// or that reports a zero input size.
pub fn load_networks<P>(provider: &P) -> Result<Networks, CascadeError>
where
    P: ModelProvider + ?Sized,
{
    let load = |stage: Stage| -> Result<Box<dyn Network>, CascadeError> {
        let network = provider
            .load(stage)
            .map_err(|source| CascadeError::ModelLoad { stage, source })?;
        check_input_size(stage, &*network)?;
        info!(%stage, input_size = network.input_size(), "loaded network");
        Ok(network)
    };

    Ok(Networks::new(
        load(Stage::Proposal)?,
        load(Stage::Refine)?,
        load(Stage::Output)?,
    ))
}

pub(crate) fn check_input_size(stage: Stage, network: &dyn Network) -> Result<(), CascadeError> {
    match network.input_size() {
        0 => Err(CascadeError::InputSize { stage, size: 0 }),
        _ => Ok(()),
    }
}
