mod layer_layer_norm;
mod layer_spatial_norm;
