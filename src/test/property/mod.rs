mod sdim_props;
mod subview_props;
